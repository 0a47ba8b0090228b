use chrono::{DateTime, TimeZone, Utc};

use lg_core::gallery::{row_index, streak_days, thumbnail, Gallery, Thumbnail, BLUR_HASH};
use lg_core::pending::{PendingFilter, PendingQueue};
use lg_core::types::{ClientId, LastSnap, ObjectSummary};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn obj(key: &str, modified: i64) -> ObjectSummary {
    ObjectSummary {
        key: key.to_string(),
        last_modified: at(modified),
        size: 1,
    }
}

fn listing() -> Vec<ObjectSummary> {
    vec![
        obj("snap|2024-04-30T09:00:00.000Z|alice|ta|.jpg", 100),
        obj("snap|2024-05-01T09:00:00.000Z|bob|tb|.jpg", 200),
        obj("snap|2024-05-02T09:00:00.000Z|me|tm|.jpg", 300),
        obj("snap-legacy.jpg", 350),
        obj("snap|2024-05-03T09:00:00.000Z|alice|ta||hide.jpg", 400),
    ]
}

#[test]
fn pending_skips_own_and_already_seen_snaps() {
    let me = ClientId("me".to_string());
    let last = LastSnap {
        key: Some("snap|2024-04-30T09:00:00.000Z|alice|ta|.jpg".to_string()),
        last_modified: at(100),
    };
    let filter = PendingFilter {
        client: &me,
        self_send: false,
        last: &last,
    };
    let mut queue = PendingQueue::from_listing(&listing(), &filter);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.skipped(), ["snap-legacy.jpg".to_string()]);

    let first = queue.pop().unwrap();
    assert_eq!(first.key.sender.as_str(), "bob");
    assert_eq!(first.marker().last_modified, at(200));
    let second = queue.pop().unwrap();
    assert!(second.key.is_hidden());
    assert!(queue.is_empty());
}

#[test]
fn self_send_includes_own_snaps() {
    let me = ClientId("me".to_string());
    let last = LastSnap::starting_at(at(150));
    let filter = PendingFilter {
        client: &me,
        self_send: true,
        last: &last,
    };
    let queue = PendingQueue::from_listing(&listing(), &filter);
    let senders: Vec<&str> = queue.iter().map(|p| p.key.sender.as_str()).collect();
    assert_eq!(senders, ["bob", "me", "alice"]);
    assert_eq!(filter.start_after(), None);
}

#[test]
fn pending_requires_strictly_newer_modification() {
    let me = ClientId("me".to_string());
    let last = LastSnap::starting_at(at(400));
    let filter = PendingFilter {
        client: &me,
        self_send: false,
        last: &last,
    };
    assert!(PendingQueue::from_listing(&listing(), &filter).is_empty());
}

#[test]
fn gallery_is_newest_first_in_rows() {
    let gallery = Gallery::from_listing(listing());
    assert_eq!(gallery.len(), 4);
    assert_eq!(gallery.skipped, ["snap-legacy.jpg".to_string()]);

    let rows = gallery.rows(2);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0].key.sender.as_str(), "alice");
    assert!(rows[0][0].key.is_hidden());
    assert_eq!(rows[1][1].key.month(), "2024-04");
    assert_eq!(row_index(3, 2), 1);
}

#[test]
fn gallery_groups_by_month() {
    let gallery = Gallery::from_listing(listing());
    let buckets = gallery.by_month(3);
    let months: Vec<&str> = buckets.iter().map(|b| b.month.as_str()).collect();
    assert_eq!(months, ["2024-05", "2024-04"]);
    assert_eq!(buckets[0].rows.len(), 1);
    assert_eq!(buckets[0].rows[0].len(), 3);
    assert_eq!(buckets[1].rows[0].len(), 1);
}

#[test]
fn hidden_thumbnails_are_blurred_until_revealed() {
    let gallery = Gallery::from_listing(listing());
    let hidden = &gallery.entries[0].key;
    assert_eq!(
        thumbnail(hidden, "https://x".to_string(), false),
        Thumbnail::Placeholder {
            blurhash: BLUR_HASH
        }
    );
    assert_eq!(
        thumbnail(hidden, "https://x".to_string(), true),
        Thumbnail::Image {
            url: "https://x".to_string()
        }
    );
}

#[test]
fn streak_counts_whole_days() {
    let day = 24 * 60 * 60;
    assert_eq!(streak_days(at(0), at(3 * day + 10)), 3);
    assert_eq!(streak_days(at(0), at(day - 1)), 0);
    assert!(streak_days(at(day), at(0)) < 0);
}
