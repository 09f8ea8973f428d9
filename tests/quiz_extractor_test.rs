// tests/quiz_extractor_test.rs

mod common;

use common::*;
use mockito::Matcher;
use moodle_dl::{
    downloader::ArtifactWriter,
    extractor::{ContentExtractor, QuizExtractor},
    models::{ContentKind, ExtractOutcome},
};
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const START_FORM: &str = r#"<form method="post" action="/mod/quiz/startattempt.php">
  <input type="hidden" name="cmid" value="6"><input type="hidden" name="sesskey" value="abc">
  <button type="submit" id="single_button1">Tenter le test</button></form>"#;

const REVIEW: &str = r#"<html><head><title>Quiz 1: Relecture</title></head><body><div id="region-main">
<div id="q1" class="que multichoice deferredfeedback correct"><div class="content"><div class="formulation">
  <div class="qtext"><p>Unité de la force ?</p></div>
  <div class="answer">
    <div class="r0 correct"><input type="radio" id="q1:1_answer0" name="q1:1_answer" value="0">
      <div data-region="answer-label"><span class="answernumber">a. </span>Newton</div></div>
    <div class="r1"><input type="radio" id="q1:1_answer1" name="q1:1_answer" value="1">
      <div data-region="answer-label"><span class="answernumber">b. </span>Joule</div></div>
  </div></div>
  <div class="outcome"><div class="rightanswer">The correct answer is: Newton</div></div></div></div>
<div id="q2" class="que shortanswer deferredfeedback notanswered"><div class="content"><div class="formulation">
  <div class="qtext">Donnez g en m/s².</div><div class="ablock"><input type="text" name="q1:2_answer"></div></div></div></div>
</div></body></html>"#;

fn quiz_reference(server: &mockito::ServerGuard) -> moodle_dl::models::ContentReference {
    reference(format!("{}/mod/quiz/view.php?id=6", server.url()), ContentKind::Quiz, "Quiz 1", Some("quiz"))
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_existing_review_is_used_without_new_attempt() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        &format!(
            r#"<html><body><h1>Quiz 1</h1><table class="quizattemptsummary">
            <tr><td><a href="/mod/quiz/review.php?attempt=10&amp;cmid=6">Relecture</a></td></tr>
            <tr><td><a href="/mod/quiz/review.php?attempt=11&amp;cmid=6">Relecture</a></td></tr></table>{}</body></html>"#,
            START_FORM
        ),
    )
    .await;
    let start = server
        .mock("POST", "/mod/quiz/startattempt.php")
        .expect(0)
        .create_async()
        .await;
    let review = server
        .mock("GET", "/mod/quiz/review.php?attempt=11&cmid=6&showall=1")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(REVIEW)
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = quiz_reference(&server);

    let outcome = QuizExtractor::new(true).extract(&mut handle, &reference, &writer).await.unwrap();
    let ExtractOutcome::Written(files) = outcome else { panic!("expected written snapshot") };
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path.file_name().unwrap(), "Quiz 1.json");

    let json = read_json(&files[0].path);
    assert_eq!(json["quiz_title"], "Quiz 1");
    assert_eq!(json["source_url"], reference.url.as_str());
    assert_eq!(json["questions"].as_array().unwrap().len(), 2);
    assert_eq!(json["questions"][0]["prompt"], "Unité de la force ?");
    assert_eq!(json["questions"][0]["options"], serde_json::json!(["Newton", "Joule"]));
    assert_eq!(json["questions"][0]["correct_answer"]["option_indices"], serde_json::json!([0]));
    // 没有公开答案的题目不带答案字段
    assert!(json["questions"][1].get("correct_answer").is_none());

    start.assert_async().await;
    review.assert_async().await;
}

#[tokio::test]
async fn test_new_attempt_is_started_and_submitted_blank() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        &format!("<html><body><h1>Quiz 1</h1>{}</body></html>", START_FORM),
    )
    .await;
    let start = server
        .mock("POST", "/mod/quiz/startattempt.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cmid".into(), "6".into()),
            Matcher::UrlEncoded("sesskey".into(), "abc".into()),
        ]))
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(
            r#"<html><body><form id="responseform" method="post" action="/mod/quiz/processattempt.php?cmid=6">
            <input type="hidden" name="attempt" value="21"><input type="hidden" name="sesskey" value="abc">
            <input type="radio" name="q21:1_answer" value="0"><input type="radio" name="q21:1_answer" value="1">
            <input type="submit" name="next" value="Terminer le test">
            </form></body></html>"#,
        )
        .expect(1)
        .create_async()
        .await;
    let process = server
        .mock("POST", "/mod/quiz/processattempt.php?cmid=6")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("attempt".into(), "21".into()),
            Matcher::UrlEncoded("finishattempt".into(), "1".into()),
            Matcher::UrlEncoded("timeup".into(), "0".into()),
        ]))
        .with_status(303)
        .with_header("location", "/mod/quiz/review.php?attempt=21")
        .expect(1)
        .create_async()
        .await;
    mock_html(&mut server, "/mod/quiz/review.php?attempt=21", REVIEW).await;
    mock_html(&mut server, "/mod/quiz/review.php?attempt=21&showall=1", REVIEW).await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;

    let outcome = QuizExtractor::new(true)
        .extract(&mut handle, &quiz_reference(&server), &writer)
        .await
        .unwrap();
    let ExtractOutcome::Written(files) = outcome else { panic!("expected written snapshot") };
    let json = read_json(&files[0].path);
    assert_eq!(json["questions"][0]["options"][1], "Joule");

    start.assert_async().await;
    process.assert_async().await;
}

#[tokio::test]
async fn test_no_new_attempts_policy_makes_quiz_unavailable() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        &format!("<html><body><h1>Quiz 1</h1>{}</body></html>", START_FORM),
    )
    .await;
    let start = server.mock("POST", "/mod/quiz/startattempt.php").expect(0).create_async().await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;

    let outcome = QuizExtractor::new(false)
        .extract(&mut handle, &quiz_reference(&server), &writer)
        .await
        .unwrap();
    assert!(matches!(outcome, ExtractOutcome::Unavailable { ref captured, .. } if captured.is_empty()));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    start.assert_async().await;
}

#[tokio::test]
async fn test_closed_quiz_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        r#"<html><body><h1>Quiz 1</h1><div class="quizinfo"><p>This quiz closed on Monday, 2 September 2024.</p></div></body></html>"#,
    )
    .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;

    let outcome = QuizExtractor::new(true)
        .extract(&mut handle, &quiz_reference(&server), &writer)
        .await
        .unwrap();
    let ExtractOutcome::Unavailable { reason, captured } = outcome else { panic!("expected unavailable") };
    assert!(reason.contains("this quiz closed"), "reason: {}", reason);
    // 关闭的测验保存概览页
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].path.file_name().unwrap(), "Quiz 1_closed.html");
    assert!(fs::read_to_string(&captured[0].path).unwrap().contains("This quiz closed on Monday"));
}

#[tokio::test]
async fn test_password_protected_quiz_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        &format!("<html><body><h1>Quiz 1</h1>{}</body></html>", START_FORM),
    )
    .await;
    server
        .mock("POST", "/mod/quiz/startattempt.php")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(
            r#"<html><body><form method="post" action="/mod/quiz/startattempt.php">
            <input type="hidden" name="cmid" value="6"><input type="password" name="quizpassword">
            <input type="submit" name="submitbutton" value="Commencer"></form></body></html>"#,
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;

    let outcome = QuizExtractor::new(true)
        .extract(&mut handle, &quiz_reference(&server), &writer)
        .await
        .unwrap();
    let ExtractOutcome::Unavailable { reason, captured } = outcome else { panic!("expected unavailable") };
    assert!(reason.contains("密码"), "reason: {}", reason);
    assert_eq!(captured[0].path.file_name().unwrap(), "Quiz 1_inaccessible.html");
}

#[tokio::test]
async fn test_denied_review_after_submission_is_unavailable() {
    const DENIED: &str = r#"<html><head><title>Quiz 1</title></head><body><div id="region-main">
<div class="box errorbox alert alert-danger"><p class="errormessage">You are not allowed to review this attempt.</p></div>
</div></body></html>"#;

    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/quiz/view.php?id=6",
        &format!("<html><body><h1>Quiz 1</h1>{}</body></html>", START_FORM),
    )
    .await;
    server
        .mock("POST", "/mod/quiz/startattempt.php")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(
            r#"<html><body><form id="responseform" method="post" action="/mod/quiz/processattempt.php?cmid=6">
            <input type="hidden" name="attempt" value="21"><input type="hidden" name="sesskey" value="abc">
            </form></body></html>"#,
        )
        .create_async()
        .await;
    // 交卷后平台直接显示拒绝查看的页面，查看页本身也一样
    server
        .mock("POST", "/mod/quiz/processattempt.php?cmid=6")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(DENIED)
        .expect(1)
        .create_async()
        .await;
    let review = mock_html(&mut server, "/mod/quiz/review.php?attempt=21&showall=1", DENIED).await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;

    let outcome = QuizExtractor::new(true)
        .extract(&mut handle, &quiz_reference(&server), &writer)
        .await
        .unwrap();
    let ExtractOutcome::Unavailable { reason, captured } = outcome else { panic!("empty review must not count as written") };
    assert!(reason.contains("not allowed to review"), "reason: {}", reason);
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].path.file_name().unwrap(), "Quiz 1_inaccessible.html");

    // 没有写出空的 JSON 快照
    let section = dir.path().join("01 - Semaine 1");
    let names: Vec<String> = fs::read_dir(&section)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Quiz 1_inaccessible.html"]);
    review.assert_async().await;
}
