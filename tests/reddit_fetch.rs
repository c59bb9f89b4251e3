use rcollect::{FetchError, Fetcher, RawItem, RedditConfig, RedditFetcher, SearchTask};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Request targets (path and query) in arrival order.
type Requests = Arc<Mutex<Vec<String>>>;

fn search_listing() -> Value {
    json!({"kind": "Listing", "data": {"after": null, "children": [
        {"kind": "t3", "data": {
            "id": "p1", "title": "Optimus sorts batteries", "selftext": "", "author": "alice",
            "score": 120, "num_comments": 4, "subreddit": "robotics",
            "permalink": "/r/robotics/comments/p1/optimus_sorts/"
        }},
        {"kind": "t3", "data": {
            "id": "p2", "title": "Quiet thread", "selftext": "Nobody replied.", "author": "carol",
            "score": 3, "num_comments": 0, "subreddit": "robotics",
            "permalink": "/r/robotics/comments/p2/quiet/"
        }}
    ]}})
}

fn thread_p1() -> Value {
    json!([
        {"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t3", "data": {"id": "p1", "title": "Optimus sorts batteries"}}
        ]}},
        {"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t1", "data": {"id": "k1", "body": "It acts like it knows what it is doing there.", "author": "dan", "score": 9}},
            {"kind": "t1", "data": {"id": "k2", "body": "[deleted]", "author": "[deleted]", "score": 1}},
            {"kind": "t1", "data": {"id": "k3", "body": "neat", "author": "erin", "score": 2}},
            {"kind": "more", "data": {"id": "k4", "children": ["k5", "k6"]}}
        ]}}
    ])
}

fn quiet_post(id: &str) -> Value {
    json!({"kind": "t3", "data": {
        "id": id, "title": format!("Optimus thread {id}"), "num_comments": 0,
        "subreddit": "robotics", "permalink": format!("/r/robotics/comments/{id}/t/")
    }})
}

fn respond(mut stream: TcpStream, requests: &Requests) {
    let mut req = Vec::new();
    let mut chunk = [0u8; 1024];
    while !req.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => req.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&req);
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/");
    requests.lock().unwrap().push(target.to_string());

    let (status, body) = match path {
        "/r/robotics/search.json" => ("200 OK", search_listing().to_string()),
        "/r/robotics/comments/p1/optimus_sorts/.json" => ("200 OK", thread_p1().to_string()),
        "/r/deep/search.json" if target.contains("after=t3_x") => (
            "200 OK",
            json!({"kind": "Listing", "data": {"after": "t3_y", "children": [quiet_post("d3"), quiet_post("d4")]}})
                .to_string(),
        ),
        "/r/deep/search.json" => (
            "200 OK",
            json!({"kind": "Listing", "data": {"after": "t3_x", "children": [quiet_post("d1"), quiet_post("d2")]}})
                .to_string(),
        ),
        "/r/busy/search.json" => ("429 Too Many Requests", "{}".to_string()),
        _ => ("404 Not Found", "{}".to_string()),
    };
    let resp = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes());
}

/// Serve canned Reddit responses on a loopback port for the life of the test process.
fn serve_logged() -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Requests::default();
    let log = requests.clone();
    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            respond(stream, &log);
        }
    });
    (format!("http://{addr}"), requests)
}

fn serve() -> String {
    serve_logged().0
}

fn fetcher(base_url: String) -> RedditFetcher {
    RedditFetcher::new(RedditConfig { base_url, timeout: Duration::from_secs(5), ..RedditConfig::default() }).unwrap()
}

/// Demonstrates the page shape over HTTP: one post thread per page.
/// Outcome: the first page carries the post and its one acceptable comment
/// (deleted, short and "more" children dropped); the second post has no next cursor.
#[test]
fn pages_are_post_threads() {
    let mut f = fetcher(serve());
    let task = SearchTask::new("robotics", "optimus", 10);

    let first = f.fetch_page(&task, None).unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.post_count(), 1);
    assert!(matches!(&first.items[0], RawItem::Post(p) if p.id.as_deref() == Some("p1")));
    let RawItem::Comment(c) = &first.items[1] else { panic!("expected a comment") };
    assert_eq!(c.id.as_deref(), Some("k1"));
    assert_eq!(c.link_title.as_deref(), Some("Optimus sorts batteries"));
    assert_eq!(c.subreddit.as_deref(), Some("robotics"));
    assert_eq!(first.next.as_deref(), Some("1"));

    let second = f.fetch_page(&task, first.next.as_deref()).unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(matches!(&second.items[0], RawItem::Post(p) if p.id.as_deref() == Some("p2")));
    assert_eq!(second.next, None);
}

/// The task limit trims the listing itself.
#[test]
fn listing_respects_limit() {
    let mut f = fetcher(serve());
    let task = SearchTask::new("robotics", "optimus", 1);
    let page = f.fetch_page(&task, None).unwrap();
    assert_eq!(page.next, None);
}

/// Demonstrates status mapping. Outcome: 429 is transient, 404 is permanent.
#[test]
fn http_status_maps_to_error_kind() {
    let base = serve();
    let mut f = fetcher(base);
    let busy = f.fetch_page(&SearchTask::new("busy", "optimus", 10), None).unwrap_err();
    assert!(busy.is_transient(), "{busy}");
    let gone = f.fetch_page(&SearchTask::new("gone", "optimus", 10), None).unwrap_err();
    assert!(matches!(gone, FetchError::Permanent(_)), "{gone}");
}

/// A malformed cursor is a permanent error rather than a restart from page one.
#[test]
fn bad_cursor_is_permanent() {
    let mut f = fetcher(serve());
    let err = f.fetch_page(&SearchTask::new("robotics", "optimus", 10), Some("abc")).unwrap_err();
    assert!(matches!(err, FetchError::Permanent(_)));
}

/// Demonstrates listing continuation through Reddit's `after` token.
/// Outcome: the cursor crosses from the first listing into the second, the second
/// request asks only for the remaining posts, and the limit ends the task there.
#[test]
fn listing_grows_through_after_token() {
    let (base, requests) = serve_logged();
    let mut f = fetcher(base);
    let task = SearchTask::new("deep", "optimus", 3);

    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = f.fetch_page(&task, cursor.as_deref()).unwrap();
        for item in &page.items {
            if let RawItem::Post(p) = item {
                ids.push(p.id.clone().unwrap_or_default());
            }
        }
        cursor = page.next;
        if cursor.is_none() {
            break;
        }
    }
    assert_eq!(ids, ["d1", "d2", "d3"]);

    let searches: Vec<String> = requests
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.starts_with("/r/deep/search.json"))
        .cloned()
        .collect();
    assert_eq!(searches.len(), 2, "{searches:?}");
    assert!(searches[0].contains("limit=3") && !searches[0].contains("after="), "{}", searches[0]);
    assert!(searches[1].contains("after=t3_x") && searches[1].contains("limit=1"), "{}", searches[1]);
}
