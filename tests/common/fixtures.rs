//! Catalog page fixtures and mock mounting helpers

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Index page linking to `ids` (duplicates and navigation noise included)
pub fn index_page(year: u16, ids: &[&str]) -> String {
    let mut html = String::from(
        "<html><body>\n<nav><a href=\"/videos/\">Videos</a> <a href=\"/videos/play/wwdc2015/101/\">Last year</a></nav>\n",
    );
    for id in ids {
        html.push_str(&format!(
            "<section><a href=\"/videos/play/wwdc{year}/{id}/\"><img src=\"/t/{id}.jpg\"></a>\n\
             <a href=\"/videos/play/wwdc{year}/{id}/\">Session {id}</a></section>\n"
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Session page with an HD link, an SD link and a slides link
pub fn session_page(server: &MockServer, id: &str) -> String {
    let base = server.uri();
    format!(
        "<html><body><h1>Session {id}</h1>\n\
         <ul class=\"links\">\n\
         <li><a href=\"{base}/media/s{id}_hd.mov?dl=1\">HD Video</a></li>\n\
         <li><a href=\"{base}/media/s{id}_sd.mov?dl=1\">SD Video</a></li>\n\
         <li><a href=\"{base}/media/s{id}.pdf?dl=1\">Presentation Slides (PDF)</a></li>\n\
         </ul></body></html>"
    )
}

/// Session page carrying only the anchors given
pub fn session_page_with(anchors: &[String]) -> String {
    format!(
        "<html><body><ul>{}</ul></body></html>",
        anchors
            .iter()
            .map(|a| format!("<li>{}</li>", a))
            .collect::<String>()
    )
}

/// Anchor markup for a download link
pub fn anchor(href: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", href, label)
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serve the year index page
pub async fn mount_index(server: &MockServer, year: u16, html: String) {
    Mock::given(method("GET"))
        .and(path(format!("/videos/wwdc{}/", year)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Serve a session detail page
pub async fn mount_session(server: &MockServer, year: u16, id: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(format!("/videos/play/wwdc{}/{}/", year, id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Serve a media file under `/media/<name>`
pub async fn mount_media(server: &MockServer, name: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/media/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Serve a complete session: page, HD video and slides
pub async fn mount_full_session(server: &MockServer, year: u16, id: &str, video_len: usize) {
    mount_session(server, year, id, session_page(server, id)).await;
    mount_media(server, &format!("s{}_hd.mov", id), payload(video_len)).await;
    mount_media(server, &format!("s{}.pdf", id), b"%PDF-1.4 slides".to_vec()).await;
}
