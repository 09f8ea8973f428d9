// tests/course_enumerator_test.rs

mod common;

use common::*;
use moodle_dl::{crawler::CourseLinkEnumerator, error::AppError, models::ContentKind};

const COURSE: &str = r#"<html><head><title>Course: Physique 101</title></head><body>
<div id="region-main"><h1>Physique 101</h1><ul class="topics">
  <li class="section main" data-sectionname="Introduction">
    <ul class="section">
      <li class="activity resource modtype_resource"><a class="aalink" href="/mod/resource/view.php?id=2"><span class="instancename">Syllabus<span class="accesshide"> Fichier</span></span></a></li>
      <li class="activity resource modtype_resource"><a class="aalink" href="/mod/resource/view.php?id=2#anchor"><span class="instancename">Syllabus</span></a></li>
      <li class="activity forum modtype_forum"><a class="aalink" href="/mod/forum/view.php?id=3"><span class="instancename">Forum</span></a></li>
    </ul>
  </li>
  <li class="section main"><h3 class="sectionname">Mécanique</h3>
    <ul class="section">
      <li class="activity folder modtype_folder"><a class="aalink" href="/mod/folder/view.php?id=4"><span class="instancename">TD</span></a></li>
      <li class="activity folder modtype_folder"><a class="aalink" href="/mod/folder/view.php?id=5"><span class="instancename">Archives</span></a></li>
      <li class="activity quiz modtype_quiz"><a class="aalink" href="/mod/quiz/view.php?id=6"><span class="instancename">Quiz 1</span></a></li>
      <li class="activity hvp modtype_hvp"><a class="aalink" href="/mod/hvp/view.php?id=7"><span class="instancename">Vidéo interactive</span></a></li>
      <li class="activity resource modtype_resource"><a class="aalink" href="/mod/resource/view.php?id=2"><span class="instancename">Syllabus (rappel)</span></a></li>
    </ul>
  </li>
</ul></div></body></html>"#;

const FOLDER: &str = r#"<html><body><div id="region-main"><h2>TD</h2>
<ul><li><a href="/pluginfile.php/44/mod_folder/content/0/td1.pdf?forcedownload=1">td1.pdf</a></li>
<li><a href="/pluginfile.php/44/mod_folder/content/0/td2.pdf?forcedownload=1">td2.pdf</a></li></ul>
</div></body></html>"#;

#[tokio::test]
async fn test_enumerates_course_in_page_order() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(&mut server, "/course/view.php?id=12", COURSE).await;
    mock_html(&mut server, "/mod/folder/view.php?id=4", FOLDER).await;
    server
        .mock("GET", "/mod/folder/view.php?id=5")
        .with_status(404)
        .create_async()
        .await;

    let mut handle = login(&server).await;
    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &format!("{}/course/view.php?id=12", server.url()))
        .await
        .unwrap();
    assert_eq!(enumerator.course_title(), "Physique 101");

    let refs = enumerator.collect_all(&mut handle).await.unwrap();
    let summary: Vec<_> = refs
        .iter()
        .map(|r| (r.kind, r.display_name.as_str(), r.section_path.join("/")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ContentKind::Resource, "Syllabus", "00 - Introduction".to_string()),
            (ContentKind::Resource, "td1.pdf", "01 - Mécanique/TD".to_string()),
            (ContentKind::Resource, "td2.pdf", "01 - Mécanique/TD".to_string()),
            (ContentKind::Quiz, "Quiz 1", "01 - Mécanique".to_string()),
            (ContentKind::H5P, "Vidéo interactive", "01 - Mécanique".to_string()),
            // 同一地址出现在另一个章节中，视为不同条目
            (ContentKind::Resource, "Syllabus (rappel)", "01 - Mécanique".to_string()),
        ]
    );
    assert!(refs.iter().all(|r| !r.url.contains('#')));

    // 无法展开的文件夹不会中断枚举
    let failures = enumerator.take_failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].0.ends_with("/mod/folder/view.php?id=5"));
    assert!(!failures[0].1.is_fatal());
    assert!(matches!(failures[0].1, AppError::Fetch(_)));
}

#[tokio::test]
async fn test_enumeration_yields_lazily() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(&mut server, "/course/view.php?id=12", COURSE).await;
    let folder = server
        .mock("GET", "/mod/folder/view.php?id=4")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(FOLDER)
        .expect(0)
        .create_async()
        .await;

    let mut handle = login(&server).await;
    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &format!("{}/course/view.php?id=12", server.url()))
        .await
        .unwrap();
    let first = enumerator.next(&mut handle).await.unwrap().unwrap();
    assert_eq!(first.display_name, "Syllabus");
    assert_eq!(first.module.as_deref(), Some("resource"));

    // 只取了第一个条目，文件夹尚未被请求
    folder.assert_async().await;
}

#[tokio::test]
async fn test_section_pages_are_followed_once() {
    const COLLAPSED: &str = r#"<html><head><title>Course: Optique</title></head><body><div id="region-main"><ul class="topics">
  <li id="section-0" class="section main" data-sectionname="Infos"><ul class="section">
    <li class="activity resource modtype_resource"><a class="aalink" href="/mod/resource/view.php?id=2"><span class="instancename">Plan</span></a></li>
  </ul></li>
  <li id="section-1" class="section main"><h3 class="sectionname"><a href="/course/view.php?id=12&amp;section=1">Semaine 1</a></h3>
    <div class="summary"><a href="/course/view.php?id=12&amp;section=1">Voir la semaine</a></div></li>
</ul></div></body></html>"#;
    const SECTION_ONE: &str = r#"<html><body><div id="region-main"><ul class="topics">
  <li id="section-1" class="section main"><h3 class="sectionname">Semaine 1</h3><ul class="section">
    <li class="activity resource modtype_resource"><a class="aalink" href="/mod/resource/view.php?id=31"><span class="instancename">Lentilles</span></a></li>
  </ul></li>
</ul></div></body></html>"#;

    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(&mut server, "/course/view.php?id=12", COLLAPSED).await;
    let section = server
        .mock("GET", "/course/view.php?id=12&section=1")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(SECTION_ONE)
        .expect(1)
        .create_async()
        .await;

    let mut handle = login(&server).await;
    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &format!("{}/course/view.php?id=12", server.url()))
        .await
        .unwrap();
    let refs = enumerator.collect_all(&mut handle).await.unwrap();
    let summary: Vec<_> = refs
        .iter()
        .map(|r| (r.kind, r.display_name.as_str(), r.section_path.join("/")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ContentKind::Resource, "Plan", "00 - Infos".to_string()),
            (ContentKind::Resource, "Lentilles", "01 - Semaine 1".to_string()),
        ]
    );
    assert_eq!(refs[1].url, format!("{}/mod/resource/view.php?id=31", server.url()));
    assert!(enumerator.take_failures().is_empty());
    section.assert_async().await;
}

#[tokio::test]
async fn test_flat_course_links_to_section_page() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/course/view.php?id=12",
        r#"<html><head><title>Course: Optique</title></head><body><div id="region-main">
        <a href="/course/view.php?id=12&amp;section=1">Semaine 1</a></div></body></html>"#,
    )
    .await;
    mock_html(
        &mut server,
        "/course/view.php?id=12&section=1",
        r#"<html><body><div id="region-main"><a href="/mod/resource/view.php?id=31">Lentilles</a></div></body></html>"#,
    )
    .await;

    let mut handle = login(&server).await;
    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &format!("{}/course/view.php?id=12", server.url()))
        .await
        .unwrap();
    let refs = enumerator.collect_all(&mut handle).await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].display_name, "Lentilles");
    assert_eq!(refs[0].module.as_deref(), Some("resource"));
    assert_eq!(refs[0].section_path, vec!["01 - Semaine 1".to_string()]);
}

#[tokio::test]
async fn test_links_inside_pages_are_enumerated_after_the_page() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/course/view.php?id=12",
        r#"<html><head><title>Course: Optique</title></head><body><div id="region-main"><ul class="topics">
        <li class="section main" data-sectionname="Infos"><ul class="section">
          <li class="activity page modtype_page"><a class="aalink" href="/mod/page/view.php?id=8"><span class="instancename">Consignes</span></a></li>
          <li class="activity quiz modtype_quiz"><a class="aalink" href="/mod/quiz/view.php?id=6"><span class="instancename">Quiz 1</span></a></li>
        </ul></li></ul></div></body></html>"#,
    )
    .await;
    let page = server
        .mock("GET", "/mod/page/view.php?id=8")
        .with_status(200)
        .with_header("content-type", HTML)
        .with_body(
            r#"<html><body><div id="region-main"><div class="box generalbox"><div class="no-overflow">
            <a href="/pluginfile.php/20/mod_page/content/3/fiche.pdf">Fiche</a>
            <a href="/mod/page/view.php?id=9">Autre page</a></div></div>
            <div class="activity-navigation"><a id="next-activity-link" href="/mod/quiz/view.php?id=6">Quiz 1</a></div>
            </div></body></html>"#,
        )
        .expect(1)
        .create_async()
        .await;

    let mut handle = login(&server).await;
    let mut enumerator = CourseLinkEnumerator::open(&mut handle, &format!("{}/course/view.php?id=12", server.url()))
        .await
        .unwrap();
    let refs = enumerator.collect_all(&mut handle).await.unwrap();
    let summary: Vec<_> = refs
        .iter()
        .map(|r| (r.kind, r.display_name.as_str(), r.section_path.join("/")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ContentKind::Resource, "Consignes", "00 - Infos".to_string()),
            (ContentKind::Resource, "Fiche", "00 - Infos/Consignes".to_string()),
            (ContentKind::Quiz, "Quiz 1", "00 - Infos".to_string()),
        ]
    );
    page.assert_async().await;
}
