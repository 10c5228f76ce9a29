use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::Mutex;

use stash_contracts::Performer;

/// Charset for the uniqueness suffix of a canonical subject name.
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 16;

static PERSON_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Person .+$").unwrap());

/// One random source for the whole process. A per-call generator would give
/// correlated suffixes under fast successive calls.
static SUBJECT_RNG: Lazy<Mutex<StdRng>> = Lazy::new(|| Mutex::new(StdRng::from_entropy()));

/// Uppercase-alphanumeric token from the process-wide source. Also used for
/// placeholder display names of freshly created performers.
pub fn random_token(len: usize) -> String {
    let mut rng = SUBJECT_RNG.lock().unwrap();
    (0..len)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Builds the canonical subject name `Person <performerId> <suffix>` where
/// the suffix is sixteen uppercase-alphanumeric characters. The prefix binds
/// the subject to the performer; the suffix only guarantees uniqueness when
/// a performer is re-bound.
pub fn create_subject_name(performer_id: &str) -> String {
    format!("Person {} {}", performer_id, random_token(SUFFIX_LEN))
}

/// Returns the performer's existing subject-name alias, if any: the first
/// alias matching `^Person .+$`, falling back to the display name. Matching
/// is case-sensitive.
pub fn find_person_alias(performer: &Performer) -> Option<String> {
    performer
        .alias_list
        .iter()
        .find(|alias| PERSON_ALIAS.is_match(alias))
        .cloned()
        .or_else(|| {
            if PERSON_ALIAS.is_match(&performer.name) {
                Some(performer.name.clone())
            } else {
                None
            }
        })
}

/// Inverse of [`create_subject_name`]: the performer id embedded in a
/// canonical subject name, or `None` when the name is not canonical.
pub fn extract_performer_id(subject_name: &str) -> Option<String> {
    let mut tokens = subject_name.split(' ');
    if tokens.next() != Some("Person") {
        return None;
    }
    let id = tokens.next().filter(|id| !id.is_empty())?;
    let suffix = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    if suffix.len() != SUFFIX_LEN
        || !suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_name_has_canonical_shape() {
        let name = create_subject_name("42");
        assert!(name.starts_with("Person 42 "));
        let suffix = name.rsplit(' ').next().unwrap();
        assert_eq!(suffix.len(), 16);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn subject_names_are_independent_samples() {
        let a = create_subject_name("42");
        let b = create_subject_name("42");
        assert_ne!(a, b);
    }

    #[test]
    fn extract_round_trips_created_names() {
        for id in ["1", "42", "abc-def", "999999"] {
            let name = create_subject_name(id);
            assert_eq!(extract_performer_id(&name).as_deref(), Some(id));
        }
    }

    #[test]
    fn extract_rejects_non_canonical_names() {
        assert_eq!(extract_performer_id("Jane Doe"), None);
        assert_eq!(extract_performer_id("Person 42"), None);
        assert_eq!(extract_performer_id("Person 42 short"), None);
        // lowercase suffix
        assert_eq!(extract_performer_id("Person 42 abcdefghijklmnop"), None);
        // trailing token
        assert_eq!(
            extract_performer_id("Person 42 ABCDEFGHIJKLMNOP extra"),
            None
        );
        assert_eq!(extract_performer_id(""), None);
    }

    #[test]
    fn alias_lookup_prefers_alias_list_order() {
        let performer = Performer {
            id: "7".into(),
            name: "Jane".into(),
            alias_list: vec![
                "JD".into(),
                "Person 7 ABCDEFGHIJKLMNOP".into(),
                "Person 7 QRSTUVWXYZ012345".into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            find_person_alias(&performer).as_deref(),
            Some("Person 7 ABCDEFGHIJKLMNOP")
        );
    }

    #[test]
    fn alias_lookup_falls_back_to_display_name() {
        let performer = Performer {
            id: "7".into(),
            name: "Person 7 ABCDEFGHIJKLMNOP".into(),
            alias_list: vec!["JD".into()],
            ..Default::default()
        };
        assert_eq!(
            find_person_alias(&performer).as_deref(),
            Some("Person 7 ABCDEFGHIJKLMNOP")
        );
    }

    #[test]
    fn alias_lookup_requires_a_value_after_the_prefix() {
        let performer = Performer {
            id: "7".into(),
            name: "Person ".into(),
            alias_list: vec!["Person ".into(), "person 7 x".into()],
            ..Default::default()
        };
        assert_eq!(find_person_alias(&performer), None);
    }
}
