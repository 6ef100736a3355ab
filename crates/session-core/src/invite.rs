//! Shareable join-link construction.
//!
//! Pure string building: no session state, no side effects, callable before
//! or after the connection exists.

use common::MeetingId;

/// Build a shareable join URL of the form
/// `<origin>/join-meeting/<meetingId>?host=<url-encoded-name>`.
///
/// Deterministic: identical inputs produce byte-identical output. The host
/// name is percent-encoded (a space becomes `%20`). A trailing slash on
/// `origin` is tolerated.
#[must_use]
pub fn build_link(origin: &str, meeting_id: &MeetingId, host_name: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let encoded_host = urlencoding::encode(host_name);
    format!("{origin}/join-meeting/{meeting_id}?host={encoded_host}")
}
