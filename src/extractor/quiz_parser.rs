// src/extractor/quiz_parser.rs

use crate::{
    constants,
    models::{AnswerOption, CorrectAnswer, QuestionBlock},
    session::{ParsedPage, visible_text},
    utils,
};
use log::{debug, warn};
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::{collections::HashSet, sync::LazyLock};

static QUESTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.que").unwrap());
static FORMULATION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.formulation").unwrap());
static PROMPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".qtext, .prompt, legend").unwrap());
static ANSWER_ROW_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".answer > div, .answer > p, .answer > li, .answer tr").unwrap()
});
static CHOICE_INPUT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="radio"], input[type="checkbox"]"#).unwrap());
static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());
static ANSWER_LABEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-region="answer-label"]"#).unwrap());
static ANSWER_NUMBER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".answernumber").unwrap());
static RIGHT_ANSWER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".rightanswer").unwrap());

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[a-zA-Z]|[ivxIVX]{1,4}|\d{1,2})[.)]\s+").unwrap());
static PAGE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(page\s*\d+\s*(?:sur|of)\s*\d+\)").unwrap());
static JUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    let phrases: Vec<String> = constants::QUIZ_JUNK_PHRASES.iter().map(|p| regex::escape(p)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", phrases.join("|"))).unwrap()
});

/// 解析结果。无法识别的题目被跳过并计数，而不是让整份测验失败。
#[derive(Debug, Default)]
pub struct ParsedQuestions {
    pub questions: Vec<QuestionBlock>,
    pub skipped: usize,
}

pub fn parse_questions(page: &ParsedPage) -> ParsedQuestions {
    let mut blocks: Vec<ElementRef<'_>> = page.select(&QUESTION_SEL).collect();
    if blocks.is_empty() {
        blocks = page.select(&FORMULATION_SEL).collect();
    }

    let mut parsed = ParsedQuestions::default();
    for (index, block) in blocks.into_iter().enumerate() {
        match parse_question(block) {
            Some(question) => parsed.questions.push(question),
            None => {
                warn!("第 {} 题无法识别题干，已跳过", index + 1);
                parsed.skipped += 1;
            }
        }
    }
    debug!(
        "解析出 {} 道题目 (跳过 {})",
        parsed.questions.len(),
        parsed.skipped
    );
    parsed
}

/// 去掉 "(page 1 of 3)" 之类的分页后缀
pub fn clean_title(title: &str) -> String {
    utils::normalize_whitespace(&PAGE_SUFFIX_RE.replace_all(title, ""))
}

fn parse_question(block: ElementRef<'_>) -> Option<QuestionBlock> {
    let prompt = block
        .select(&PROMPT_SEL)
        .map(visible_text)
        .find(|t| !t.is_empty())?;

    let mut options = Vec::new();
    let mut flagged = Vec::new();
    let mut seen = HashSet::new();
    for row in block.select(&ANSWER_ROW_SEL) {
        let Some(text) = option_text(block, row) else { continue };
        if !seen.insert(text.to_lowercase()) {
            continue;
        }
        if row.value().classes().any(|c| c == "correct") {
            flagged.push(options.len());
        }
        options.push(AnswerOption { text });
    }

    let right_answer = block
        .select(&RIGHT_ANSWER_SEL)
        .map(visible_text)
        .find(|t| !t.is_empty());
    let correct_answer = correct_answer(&options, flagged, right_answer);

    Some(QuestionBlock {
        prompt,
        options,
        correct_answer,
    })
}

fn option_text(block: ElementRef<'_>, row: ElementRef<'_>) -> Option<String> {
    let labelled = row.select(&ANSWER_LABEL_SEL).next().map(|label| {
        // 新版界面把编号放在单独的元素里
        let number = label.select(&ANSWER_NUMBER_SEL).next().map(visible_text);
        let text = visible_text(label);
        match number {
            Some(n) if !n.is_empty() => text.trim_start_matches(n.as_str()).trim().to_string(),
            _ => text,
        }
    });
    let text = labelled
        .or_else(|| {
            let input_id = row.select(&CHOICE_INPUT_SEL).next()?.value().attr("id")?;
            block
                .select(&LABEL_SEL)
                .find(|l| l.value().attr("for") == Some(input_id))
                .map(visible_text)
        })
        .or_else(|| row.select(&LABEL_SEL).next().map(visible_text))
        .unwrap_or_else(|| visible_text(row));

    let text = NUMBERING_RE.replace(&text, "").trim().to_string();
    let text = strip_junk(&text);
    if text.is_empty() { None } else { Some(text) }
}

fn strip_junk(text: &str) -> String {
    utils::normalize_whitespace(&JUNK_RE.replace_all(text, " "))
}

/// 正确答案只来自页面公开的信息：选项上的 `correct` 标记或 `.rightanswer` 反馈
fn correct_answer(
    options: &[AnswerOption],
    flagged: Vec<usize>,
    right_answer: Option<String>,
) -> Option<CorrectAnswer> {
    let option_indices = if flagged.is_empty() {
        right_answer
            .as_deref()
            .map(|text| match_right_answer(options, text))
            .unwrap_or_default()
    } else {
        flagged
    };
    if option_indices.is_empty() && right_answer.is_none() {
        return None;
    }
    Some(CorrectAnswer {
        option_indices,
        text: right_answer,
    })
}

fn match_right_answer(options: &[AnswerOption], feedback: &str) -> Vec<usize> {
    let answer_part = feedback.rsplit_once(':').map_or(feedback, |(_, rest)| rest).trim();
    let candidates: Vec<&str> = answer_part.split(", ").map(str::trim).collect();
    options
        .iter()
        .enumerate()
        .filter(|(_, o)| candidates.iter().any(|c| c.eq_ignore_ascii_case(&o.text)))
        .map(|(i, _)| i)
        .collect()
}
