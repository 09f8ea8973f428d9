// tests/resource_downloader_test.rs

mod common;

use common::*;
use moodle_dl::{
    downloader::{ArtifactWriter, ResourceDownloader},
    error::{AppError, DownloadError},
    models::ContentKind,
};
use std::{fs, path::Path};
use tempfile::tempdir;

const RESOURCE_VIEW: &str = r#"<html><body><div id="region-main"><h2>Chapitre 1</h2>
<div class="resourceworkaround">Cliquez sur <a href="/pluginfile.php/10/mod_resource/content/1/cours.pdf">cours.pdf</a> pour ouvrir la ressource.</div>
</div></body></html>"#;

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_view_page_resolves_to_file() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(&mut server, "/mod/resource/view.php?id=2", RESOURCE_VIEW).await;
    mock_file(&mut server, "/pluginfile.php/10/mod_resource/content/1/cours.pdf", "application/pdf", b"%PDF-1.4 v1").await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path().join("Chimie")).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(
        format!("{}/mod/resource/view.php?id=2", server.url()),
        ContentKind::Resource,
        "Chapitre 1",
        Some("resource"),
    );

    let written = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert!(!written.reused);
    assert!(written.path.ends_with("01 - Semaine 1/Chapitre 1.pdf"));
    assert_eq!(fs::read(&written.path).unwrap(), b"%PDF-1.4 v1");

    // 再次下载相同内容：沿用已有文件，不产生副本
    let again = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert!(again.reused);
    assert_eq!(again.path, written.path);
    assert_eq!(file_names(written.path.parent().unwrap()), vec!["Chapitre 1.pdf"]);
}

#[tokio::test]
async fn test_name_collision_with_different_content_gets_suffix() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_file(&mut server, "/pluginfile.php/10/a/notes.pdf", "application/pdf", b"first").await;
    mock_file(&mut server, "/pluginfile.php/11/b/notes.pdf", "application/pdf", b"second").await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let downloader = ResourceDownloader::new();

    let first = reference(format!("{}/pluginfile.php/10/a/notes.pdf", server.url()), ContentKind::Resource, "Notes", None);
    let second = reference(format!("{}/pluginfile.php/11/b/notes.pdf", server.url()), ContentKind::Resource, "Notes", None);
    let a = downloader.download(&mut handle, &first, &writer).await.unwrap();
    let b = downloader.download(&mut handle, &second, &writer).await.unwrap();

    assert_eq!(a.path.file_name().unwrap(), "Notes.pdf");
    assert_eq!(b.path.file_name().unwrap(), "Notes-2.pdf");
    assert_eq!(fs::read(&a.path).unwrap(), b"first");
    assert_eq!(fs::read(&b.path).unwrap(), b"second");
}

#[tokio::test]
async fn test_extension_from_content_disposition() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    server
        .mock("GET", "/pluginfile.php/12/mod_resource/content/3")
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_header("content-disposition", r#"attachment; filename="diapos.pptx""#)
        .with_body("pptx-bytes")
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(
        format!("{}/pluginfile.php/12/mod_resource/content/3", server.url()),
        ContentKind::Resource,
        "Diapositives",
        None,
    );
    let written = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert_eq!(written.path.file_name().unwrap(), "Diapositives.pptx");
}

#[tokio::test]
async fn test_page_module_is_saved_as_html() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/page/view.php?id=8",
        r#"<html><body><nav>menu</nav><div id="region-main"><h2>Consignes</h2><p>Rendre le TP avant vendredi.</p></div></body></html>"#,
    )
    .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(format!("{}/mod/page/view.php?id=8", server.url()), ContentKind::Resource, "Consignes", Some("page"));

    let written = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert_eq!(written.path.file_name().unwrap(), "Consignes.html");
    let html = fs::read_to_string(&written.path).unwrap();
    assert!(html.contains("Rendre le TP avant vendredi."));
    assert!(!html.contains("menu"));
}

#[tokio::test]
async fn test_url_module_to_web_page_becomes_shortcut() {
    let mut server = mockito::Server::new_async().await;
    let mut external = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    let target = format!("{}/article", external.url());
    mock_html(
        &mut server,
        "/mod/url/view.php?id=9",
        &format!(r#"<html><body><div id="region-main"><div class="urlworkaround">Cliquez sur <a href="{}">{}</a></div></div></body></html>"#, target, target),
    )
    .await;
    mock_html(&mut external, "/article", "<html><body><p>Un article</p></body></html>").await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(format!("{}/mod/url/view.php?id=9", server.url()), ContentKind::Resource, "Lecture", Some("url"));

    let written = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert_eq!(written.path.file_name().unwrap(), "Lecture.url");
    let shortcut = fs::read_to_string(&written.path).unwrap();
    assert_eq!(shortcut, format!("[InternetShortcut]\r\nURL={}\r\n", target));
}

#[tokio::test]
async fn test_url_module_to_file_downloads_it() {
    let mut server = mockito::Server::new_async().await;
    let mut external = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    let target = format!("{}/data/mesures.csv", external.url());
    mock_html(
        &mut server,
        "/mod/url/view.php?id=10",
        &format!(r#"<html><body><div class="urlworkaround"><a href="{}">mesures</a></div></body></html>"#, target),
    )
    .await;
    mock_file(&mut external, "/data/mesures.csv", "text/csv", b"t;v\n0;1\n").await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(format!("{}/mod/url/view.php?id=10", server.url()), ContentKind::Resource, "Mesures", Some("url"));

    let written = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap();
    assert_eq!(written.path.file_name().unwrap(), "Mesures.csv");
    assert_eq!(fs::read(&written.path).unwrap(), b"t;v\n0;1\n");
}

#[tokio::test]
async fn test_view_page_without_file_is_unresolvable() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/resource/view.php?id=3",
        r#"<html><body><div id="region-main"><p>Ressource indisponible</p></div></body></html>"#,
    )
    .await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(format!("{}/mod/resource/view.php?id=3", server.url()), ContentKind::Resource, "Perdu", Some("resource"));

    let err = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap_err();
    assert!(matches!(err, AppError::Download(DownloadError::Unresolvable(_))), "got {:?}", err);
    assert!(!err.is_fatal());
    // 没有写出任何文件 (包括临时文件)
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn test_second_hop_to_html_is_unresolvable() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_html(
        &mut server,
        "/mod/resource/view.php?id=4",
        r#"<html><body><div class="resourceworkaround"><a href="/pluginfile.php/13/mod_resource/content/1/index.html">index</a></div></body></html>"#,
    )
    .await;
    mock_html(&mut server, "/pluginfile.php/13/mod_resource/content/1/index.html", "<html><body>encore une page</body></html>").await;

    let dir = tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path()).unwrap();
    let mut handle = login(&server).await;
    let reference = reference(format!("{}/mod/resource/view.php?id=4", server.url()), ContentKind::Resource, "Index", Some("resource"));

    let err = ResourceDownloader::new().download(&mut handle, &reference, &writer).await.unwrap_err();
    assert!(matches!(err, AppError::Download(DownloadError::Unresolvable(_))));
}
