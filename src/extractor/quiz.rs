// src/extractor/quiz.rs

use super::{
    ContentExtractor,
    quiz_flow::{self, QuizEvent, QuizPolicy, QuizState},
    quiz_parser,
};
use crate::{
    constants::{self, moodle},
    downloader::ArtifactWriter,
    error::{AppError, AppResult},
    models::{ContentKind, ContentReference, ExtractOutcome, QuizSnapshot, WrittenFile},
    session::{ParsedPage, SessionHandle, visible_text},
    utils,
};
use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use scraper::{ElementRef, Selector};
use std::sync::LazyLock;
use url::Url;

static REVIEW_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="review.php"][href*="attempt="]"#).unwrap());
static START_FORM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"form[action*="startattempt.php"]"#).unwrap());
static RESPONSE_FORM_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"form#responseform, form[action*="processattempt.php"]"#).unwrap()
});
static QUIZ_PASSWORD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="quizpassword"]"#).unwrap());
static FORM_INPUT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").unwrap());
static QUIZ_INFO_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".quizattempt, .quizinfo, #region-main .box, [role=\"main\"]").unwrap()
});
static NOTICE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".errormessage, .errorbox, .alert-danger, .alert-warning, .notifyproblem").unwrap()
});

const NOTICE_WIDTH: usize = 160;

/// 从页面中提取出的可提交表单
#[derive(Debug, Clone, PartialEq, Eq)]
struct HtmlForm {
    action: Url,
    fields: Vec<(String, String)>,
}

impl HtmlForm {
    fn from_element(page: &ParsedPage, form: ElementRef<'_>) -> Self {
        let action = form
            .value()
            .attr("action")
            .and_then(|a| page.resolve(a))
            .unwrap_or_else(|| page.url.clone());
        let fields = form
            .select(&FORM_INPUT_SEL)
            .filter(|input| {
                let el = input.value();
                match el.attr("type").map(str::to_ascii_lowercase).as_deref() {
                    // 不提交任何作答选择
                    Some("radio" | "checkbox") => false,
                    Some("submit" | "button" | "image" | "file") => false,
                    _ => true,
                }
            })
            .filter_map(|input| {
                let el = input.value();
                Some((el.attr("name")?.to_string(), el.attr("value").unwrap_or_default().to_string()))
            })
            .collect();
        Self { action, fields }
    }

    fn find(page: &ParsedPage, selector: &Selector) -> Option<Self> {
        page.select_first(selector).map(|form| Self::from_element(page, form))
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }
}

/// 测验不可用时留存的页面
#[derive(Debug)]
struct PageCapture {
    /// 文件名后缀，`closed` 或 `inaccessible`
    suffix: &'static str,
    html: String,
}

impl PageCapture {
    fn closed(page: &ParsedPage) -> Self {
        Self { suffix: "closed", html: page.raw.clone() }
    }

    fn inaccessible(page: &ParsedPage) -> Self {
        Self { suffix: "inaccessible", html: page.raw.clone() }
    }
}

/// 单个测验在各状态之间传递的数据
#[derive(Debug, Default)]
struct QuizRun {
    title: Option<String>,
    review_url: Option<Url>,
    start_form: Option<HtmlForm>,
    unavailable_reason: Option<String>,
    capture: Option<PageCapture>,
    snapshot: Option<QuizSnapshot>,
    written: Option<WrittenFile>,
    captured: Vec<WrittenFile>,
}

impl QuizRun {
    fn quiz_title(&self, reference: &ContentReference) -> String {
        self.title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| reference.display_name.clone())
    }
}

/// 按状态迁移表驱动单个测验：概览 → (开始作答 | 沿用已有作答) → 解析 → 写出
pub struct QuizExtractor {
    policy: QuizPolicy,
}

impl QuizExtractor {
    pub fn new(start_new_attempts: bool) -> Self {
        Self {
            policy: QuizPolicy { start_new_attempts },
        }
    }

    async fn step(
        &self,
        state: QuizState,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        run: &mut QuizRun,
    ) -> AppResult<QuizEvent> {
        match state {
            QuizState::Discover => self.discover(handle, reference, run).await,
            QuizState::EnterAttempt => self.enter_attempt(handle, run).await,
            QuizState::ReviewExisting => Ok(QuizEvent::ReviewLocated),
            QuizState::Render => self.render(handle, reference, run).await,
            QuizState::Serialize => self.serialize(reference, writer, run),
            QuizState::CapturePage => self.capture(reference, writer, run),
            QuizState::Unavailable | QuizState::Done => {
                Err(AppError::Other(anyhow!("终止状态 {} 没有后续动作", state)))
            }
        }
    }

    async fn discover(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        run: &mut QuizRun,
    ) -> AppResult<QuizEvent> {
        let page = handle.get_page(&reference.url).await?;
        run.title = page.title().map(|t| quiz_parser::clean_title(&t));

        if let Some(review) = latest_review_link(&page) {
            debug!("找到已有作答的查看链接: {}", review);
            run.review_url = Some(review);
            return Ok(QuizEvent::ReviewLinkFound);
        }
        if let Some(form) = HtmlForm::find(&page, &START_FORM_SEL) {
            debug!("没有可查看的作答，页面提供了开始作答表单: {}", form.action);
            run.start_form = Some(form);
            return Ok(QuizEvent::AttemptRequired);
        }
        match closed_phrase(&page) {
            Some(phrase) => {
                run.unavailable_reason = Some(format!("测验已关闭 ({})", phrase));
                run.capture = Some(PageCapture::closed(&page));
            }
            None => {
                run.unavailable_reason = Some("页面上既没有查看链接也没有开始作答的入口".to_string());
                run.capture = Some(PageCapture::inaccessible(&page));
            }
        }
        Ok(QuizEvent::QuizClosed)
    }

    async fn enter_attempt(&self, handle: &mut SessionHandle, run: &mut QuizRun) -> AppResult<QuizEvent> {
        let Some(start) = run.start_form.take() else {
            return Ok(QuizEvent::AttemptRejected);
        };
        info!("开始新的作答: {}", start.action);
        let mut page = handle.post_form(start.action.as_str(), &start.fields).await?;

        // 限时或设有密码的测验会先返回一个确认表单
        if let Some(mut preflight) = HtmlForm::find(&page, &START_FORM_SEL) {
            if page.select_first(&QUIZ_PASSWORD_SEL).is_some() {
                run.unavailable_reason = Some("测验需要访问密码".to_string());
                run.capture = Some(PageCapture::inaccessible(&page));
                return Ok(QuizEvent::AttemptRejected);
            }
            if preflight.field("submitbutton").is_none() {
                preflight.set("submitbutton", "Start attempt");
            }
            debug!("提交开始作答的确认表单");
            page = handle.post_form(preflight.action.as_str(), &preflight.fields).await?;
        }

        let Some(mut response) = HtmlForm::find(&page, &RESPONSE_FORM_SEL) else {
            run.unavailable_reason = Some(
                notice_text(&page)
                    .map(|notice| format!("平台没有返回作答页面: {}", notice))
                    .unwrap_or_else(|| "平台没有返回作答页面".to_string()),
            );
            run.capture = Some(PageCapture::inaccessible(&page));
            return Ok(QuizEvent::AttemptRejected);
        };
        // 不填写任何答案，直接交卷以得到可查看的作答
        response.set("finishattempt", "1");
        response.set("timeup", "0");
        let attempt_id = response.field("attempt").map(str::to_string);

        let process_url = if response.action.path().ends_with(moodle::QUIZ_PROCESS_ATTEMPT) {
            response.action.clone()
        } else {
            response.action.join(moodle::QUIZ_PROCESS_ATTEMPT)?
        };
        let landing = handle.post_form(process_url.as_str(), &response.fields).await?;

        let review = if landing.url.path().ends_with(moodle::QUIZ_REVIEW) {
            Some(landing.url.clone())
        } else {
            latest_review_link(&landing).or_else(|| {
                let id = attempt_id.as_deref()?;
                process_url.join(&format!("{}?attempt={}", moodle::QUIZ_REVIEW, id)).ok()
            })
        };
        match review {
            Some(url) => {
                info!("作答已提交，查看页: {}", url);
                run.review_url = Some(url);
                Ok(QuizEvent::AttemptSubmitted)
            }
            None => {
                run.unavailable_reason = Some("交卷后没有找到查看页".to_string());
                run.capture = Some(PageCapture::inaccessible(&landing));
                Ok(QuizEvent::AttemptRejected)
            }
        }
    }

    async fn render(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        run: &mut QuizRun,
    ) -> AppResult<QuizEvent> {
        let review = run
            .review_url
            .as_ref()
            .map(with_showall)
            .ok_or_else(|| AppError::Other(anyhow!("缺少查看页地址")))?;
        let page = handle.get_page(review.as_str()).await?;
        let parsed = quiz_parser::parse_questions(&page);
        if parsed.questions.is_empty() {
            // 空快照不算成功：多半是平台拒绝查看或返回了错误页
            let reason = match notice_text(&page) {
                Some(notice) => format!("无法查看作答: {}", notice),
                None => "查看页中没有可解析的题目".to_string(),
            };
            warn!("查看页 {} 不可用: {}", review, reason);
            run.unavailable_reason = Some(reason);
            run.capture = Some(PageCapture::inaccessible(&page));
            return Ok(QuizEvent::ReviewDenied);
        }
        if parsed.skipped > 0 {
            warn!("{} 道题目无法解析，快照只包含其余 {} 道", parsed.skipped, parsed.questions.len());
        }

        run.snapshot = Some(QuizSnapshot {
            quiz_title: run.quiz_title(reference),
            source_url: reference.url.clone(),
            questions: parsed.questions,
        });
        Ok(QuizEvent::QuestionsParsed)
    }

    fn serialize(
        &self,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        run: &mut QuizRun,
    ) -> AppResult<QuizEvent> {
        let snapshot = run
            .snapshot
            .as_ref()
            .ok_or_else(|| AppError::Other(anyhow!("缺少测验快照")))?;
        let json = serde_json::to_vec_pretty(snapshot)?;
        let filename = format!("{}.json", snapshot.quiz_title);
        run.written = Some(writer.write_bytes(&reference.section_path, &filename, &json)?);
        Ok(QuizEvent::SnapshotWritten)
    }

    fn capture(
        &self,
        reference: &ContentReference,
        writer: &ArtifactWriter,
        run: &mut QuizRun,
    ) -> AppResult<QuizEvent> {
        if let Some(capture) = run.capture.take() {
            let filename = format!("{}_{}.html", run.quiz_title(reference), capture.suffix);
            let file = writer.write_bytes(&reference.section_path, &filename, capture.html.as_bytes())?;
            info!("已保存不可用测验的页面: {}", file.path.display());
            run.captured.push(file);
        }
        Ok(QuizEvent::PageCaptured)
    }
}

#[async_trait(?Send)]
impl ContentExtractor for QuizExtractor {
    fn kind(&self) -> ContentKind {
        ContentKind::Quiz
    }

    async fn extract(
        &self,
        handle: &mut SessionHandle,
        reference: &ContentReference,
        writer: &ArtifactWriter,
    ) -> AppResult<ExtractOutcome> {
        let mut run = QuizRun::default();
        let mut state = QuizState::Discover;

        while !state.is_terminal() {
            let event = self.step(state, handle, reference, writer, &mut run).await?;
            let next = quiz_flow::next_state(state, event, &self.policy).ok_or_else(|| {
                AppError::Other(anyhow!("测验状态 {} 不接受事件 {:?}", state, event))
            })?;
            debug!("测验 '{}': {} --{:?}--> {}", reference.display_name, state, event, next);
            state = next;
        }

        match (state, run.written) {
            (QuizState::Done, Some(file)) => Ok(ExtractOutcome::Written(vec![file])),
            _ => {
                let reason = run
                    .unavailable_reason
                    .unwrap_or_else(|| "没有可查看的作答，且不允许开始新的作答".to_string());
                warn!("测验 '{}' 不可用: {}", reference.display_name, reason);
                Ok(ExtractOutcome::Unavailable {
                    reason,
                    captured: run.captured,
                })
            }
        }
    }
}

/// 概览页上最后一个 (即最新的) 查看链接
fn latest_review_link(page: &ParsedPage) -> Option<Url> {
    page.select(&REVIEW_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.resolve(href))
        .filter(|url| url.path().ends_with(moodle::QUIZ_REVIEW))
        .last()
}

/// 概览页上表明测验已关闭的短语
fn closed_phrase(page: &ParsedPage) -> Option<&'static str> {
    let text = page
        .select(&QUIZ_INFO_SEL)
        .map(visible_text)
        .collect::<Vec<_>>()
        .join(" ");
    let lower = text.to_lowercase();
    constants::QUIZ_CLOSED_PHRASES
        .iter()
        .copied()
        .find(|phrase| lower.contains(phrase))
}

/// 错误页或提示框中的第一段文字
fn notice_text(page: &ParsedPage) -> Option<String> {
    page.select(&NOTICE_SEL)
        .map(visible_text)
        .find(|text| !text.is_empty())
        .map(|text| utils::truncate_text(&text, NOTICE_WIDTH))
}

/// 一次性显示全部题目的查看页地址
fn with_showall(url: &Url) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "showall" && k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    out.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("showall", "1");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, body: &str) -> ParsedPage {
        ParsedPage::parse(Url::parse(url).unwrap(), body.to_string())
    }

    #[test]
    fn test_forms_skip_answers_and_buttons() {
        let page = page(
            "https://m.example.org/mod/quiz/attempt.php?attempt=5&cmid=3",
            r#"<form id="responseform" method="post" action="https://m.example.org/mod/quiz/processattempt.php?cmid=3">
                <input type="hidden" name="attempt" value="5">
                <input type="hidden" name="sesskey" value="abc">
                <input type="hidden" name="q5:1_:sequencecheck" value="1">
                <input type="radio" name="q5:1_answer" value="0">
                <input type="submit" name="next" value="Finish attempt ...">
            </form>"#,
        );
        let mut form = HtmlForm::find(&page, &RESPONSE_FORM_SEL).unwrap();
        assert_eq!(form.action.path(), "/mod/quiz/processattempt.php");
        assert_eq!(form.field("attempt"), Some("5"));
        assert!(form.field("q5:1_answer").is_none());
        assert!(form.field("next").is_none());
        form.set("finishattempt", "1");
        form.set("attempt", "6");
        assert_eq!(form.field("finishattempt"), Some("1"));
        assert_eq!(form.field("attempt"), Some("6"));
    }

    #[test]
    fn test_latest_review_link_and_closed_phrase() {
        let page = page(
            "https://m.example.org/mod/quiz/view.php?id=3",
            r#"<div role="main"><table class="quizattemptsummary">
                <tr><td><a href="review.php?attempt=11&cmid=3">Review</a></td></tr>
                <tr><td><a href="review.php?attempt=12&cmid=3">Review</a></td></tr></table>
                <div class="quizattempt">This quiz closed on Monday</div></div>"#,
        );
        assert_eq!(
            latest_review_link(&page).unwrap().as_str(),
            "https://m.example.org/mod/quiz/review.php?attempt=12&cmid=3"
        );
        assert_eq!(closed_phrase(&page), Some("this quiz closed"));
    }

    #[test]
    fn test_notice_text() {
        let denied = page(
            "https://m.example.org/mod/quiz/review.php?attempt=5",
            r#"<div id="region-main"><div class="box errorbox alert alert-danger">
                <p class="errormessage">You are not allowed to review this attempt.</p></div></div>"#,
        );
        assert_eq!(notice_text(&denied).as_deref(), Some("You are not allowed to review this attempt."));
        let plain = page("https://m.example.org/mod/quiz/review.php?attempt=5", "<p>Rien</p>");
        assert_eq!(notice_text(&plain), None);
    }

    #[test]
    fn test_with_showall() {
        let url = Url::parse("https://m.example.org/mod/quiz/review.php?attempt=5&page=2&cmid=3").unwrap();
        assert_eq!(
            with_showall(&url).as_str(),
            "https://m.example.org/mod/quiz/review.php?attempt=5&cmid=3&showall=1"
        );
    }
}
