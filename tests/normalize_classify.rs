#[path = "common/mod.rs"]
mod common;

use common::*;
use rcollect::{
    Classifier, DedupIndex, IdentityKey, KeywordClassifier, Normalizer, RawComment, RawItem, RawPost, RecordKind,
    SearchTask, Vocabulary,
};
use time::macros::datetime;

fn normalizer() -> Normalizer<KeywordClassifier> {
    Normalizer::new(KeywordClassifier::new(&Vocabulary::default()).unwrap())
}

fn task() -> SearchTask {
    SearchTask::new("r/teslamotors", "optimus", 100)
}

/// Demonstrates the derived fields of a post record.
/// Outcome: combined text joins title and body, length counts characters,
/// and the signal flag reflects the vocabulary.
#[test]
fn post_fields_are_derived() {
    let raw = post("abc", "Optimus füttert 🤖", "It moves like a dancer.");
    let rec = normalizer().normalize_at(&raw, &task(), datetime!(2026-01-02 03:04:05 UTC));

    assert_eq!(rec.kind, RecordKind::Post);
    assert_eq!(rec.combined_text, "Optimus füttert 🤖 It moves like a dancer.");
    assert_eq!(rec.text_length, rec.combined_text.chars().count());
    assert_eq!(rec.text_length, 41);
    assert!(rec.has_signal);
    assert_eq!(rec.author, "alice");
    assert_eq!(rec.score, 42);
    assert_eq!(rec.comment_count, Some(2));
    assert_eq!(rec.source_url, "https://old.reddit.com/r/robotics/comments/abc/slug/");
    assert_eq!(rec.origin_task, "optimus");
    assert_eq!(rec.community, "robotics");
    assert_eq!(rec.collected_at, "2026-01-02T03:04:05Z");
    assert_eq!(rec.identity_key(), Some(IdentityKey::from_raw("t3_abc")));
}

/// A sparse payload still normalizes. Outcome: documented defaults, and the
/// community falls back to the task's.
#[test]
fn missing_fields_take_defaults() {
    let raw = RawItem::Post(RawPost { id: Some("bare".into()), ..RawPost::default() });
    let rec = normalizer().normalize(&raw, &task());

    assert_eq!(rec.title, "");
    assert_eq!(rec.text, "");
    assert_eq!(rec.combined_text, "");
    assert_eq!(rec.text_length, 0);
    assert!(!rec.has_signal);
    assert_eq!(rec.author, "unknown");
    assert_eq!(rec.score, 0);
    assert_eq!(rec.comment_count, Some(0));
    assert_eq!(rec.source_url, "");
    assert_eq!(rec.community, "teslamotors");
}

/// Comments carry a "Comment on:" label but are classified on their body only.
#[test]
fn comment_label_and_body() {
    let mut c = RawComment {
        id: Some("k9".into()),
        body: Some("Honestly it is a marvel of engineering.".into()),
        author: None,
        score: Some(-3),
        ..RawComment::default()
    };
    c.link_title = Some("A very long thread title about the humanoid robot that Tesla showed".into());
    c.link_permalink = Some("/r/robotics/comments/p1/slug/".into());
    let rec = normalizer().normalize(&RawItem::Comment(c), &task());

    assert_eq!(rec.kind, RecordKind::Comment);
    assert_eq!(rec.title, "Comment on: A very long thread title about the humanoid robot ...");
    assert_eq!(rec.combined_text, "Honestly it is a marvel of engineering.");
    assert!(rec.has_signal, "\"is a\" is in the default vocabulary");
    assert_eq!(rec.author, "unknown");
    assert_eq!(rec.comment_count, None);
    assert_eq!(rec.source_url, "https://old.reddit.com/r/robotics/comments/p1/slug/");
    assert_eq!(rec.identity_key(), Some(IdentityKey::from_raw("t1_k9")));
}

/// Posts and comments with the same platform id get distinct keys; items with no
/// id get none.
#[test]
fn identity_keys_are_kind_qualified() {
    let n = normalizer();
    let p = n.normalize(&post("same", "title", ""), &task());
    let c = n.normalize(&comment("same", "body"), &task());
    assert_ne!(p.identity_key(), c.identity_key());
    assert_eq!(IdentityKey::new(RecordKind::Post, "same").as_str(), "t3_same");

    let blank = RawItem::Comment(RawComment { id: Some("  ".into()), ..RawComment::default() });
    assert_eq!(blank.id(), None);
    assert_eq!(n.normalize(&blank, &task()).identity_key(), None);
}

#[test]
fn classifier_is_case_insensitive() {
    let c = KeywordClassifier::new(&Vocabulary::default()).unwrap();
    assert!(c.classify("It SEEMS to think"));
    assert!(c.classify("reminds me of a butler"));
    assert!(!c.classify("Battery capacity is 2.3 kWh"));
}

/// Demonstrates swapping the vocabulary. Outcome: only the custom terms count;
/// regex metacharacters are matched literally.
#[test]
fn custom_vocabulary_replaces_default() {
    let vocab = Vocabulary::new(["  Uncanny ", "c++", "uncanny"]);
    assert_eq!(vocab.terms(), ["c++", "uncanny"]);
    let c = KeywordClassifier::new(&vocab).unwrap();
    assert!(c.classify("truly UNCANNY valley"));
    assert!(c.classify("written in C++"));
    assert!(!c.classify("written in c"));
    assert!(!c.classify("it moves like a person"));
}

#[test]
fn empty_vocabulary_matches_nothing() {
    let c = KeywordClassifier::new(&Vocabulary::new(Vec::<String>::new())).unwrap();
    assert!(!c.classify("it seems like anything"));
    assert!(!c.classify(""));
}

#[test]
fn vocabulary_file_skips_comments_and_blanks() {
    let dir = tempdir();
    let path = dir.join("vocab.txt");
    std::fs::write(&path, "# animacy cues\nalive\n\n  Thinks \n#wants\n").unwrap();
    let vocab = Vocabulary::from_file(&path).unwrap();
    assert_eq!(vocab.terms(), ["alive", "thinks"]);
}

/// Demonstrates dedup admission. Outcome: true once per key; seeding is only
/// allowed before the first admission.
#[test]
fn dedup_admits_once_and_seeds_first() {
    let mut idx = DedupIndex::new();
    assert!(idx.is_empty());
    let seeded = idx
        .seed([IdentityKey::from_raw("t3_a"), IdentityKey::from_raw("t3_a"), IdentityKey::from_raw("t1_b")])
        .unwrap();
    assert_eq!(seeded, 2);

    assert!(!idx.admit(&IdentityKey::from_raw("t3_a")));
    assert!(idx.admit(&IdentityKey::from_raw("t3_c")));
    assert!(!idx.admit(&IdentityKey::from_raw("t3_c")));
    assert_eq!(idx.len(), 3);
    assert_eq!(
        idx.sorted_keys().iter().map(IdentityKey::as_str).collect::<Vec<_>>(),
        ["t1_b", "t3_a", "t3_c"]
    );

    assert!(idx.seed([IdentityKey::from_raw("t3_z")]).is_err());
    assert!(!idx.contains(&IdentityKey::from_raw("t3_z")));
}
