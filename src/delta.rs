//! Snapshot diffing.

use crate::models::{Delta, Snapshot};

/// Diff two snapshots.
///
/// With no previous snapshot every principal in `current` is added. Neither
/// input is modified and each username lands in at most one set.
pub fn compute_delta(previous: Option<&Snapshot>, current: &Snapshot) -> Delta {
    let empty = Snapshot::empty();
    let previous = previous.unwrap_or(&empty);
    let mut delta = Delta::default();

    for principal in current.iter() {
        match previous.get(&principal.username) {
            None => {
                delta
                    .added
                    .insert(principal.username.clone(), principal.clone());
            }
            Some(old) if old.differs_from(principal) => {
                delta
                    .modified
                    .insert(principal.username.clone(), principal.clone());
            }
            Some(_) => {}
        }
    }

    for principal in previous.iter() {
        if !current.contains(&principal.username) {
            delta.deleted.insert(principal.username.clone());
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Principal;
    use chrono::{Duration, TimeZone, Utc};

    fn snap(principals: Vec<Principal>) -> Snapshot {
        Snapshot::from_principals(principals)
    }

    #[test]
    fn test_first_run_adds_everything() {
        let current = snap(vec![
            Principal::new("a", "h1", true),
            Principal::new("b", "h2", false),
        ]);
        let delta = compute_delta(None, &current);
        assert_eq!(delta.added.len(), 2);
        assert!(delta.modified.is_empty());
        assert!(delta.deleted.is_empty());
    }

    #[test]
    fn test_added_modified_deleted() {
        let previous = snap(vec![
            Principal::new("keep", "h", true),
            Principal::new("rotate", "old", true),
            Principal::new("lock", "h", true),
            Principal::new("drop", "h", true),
        ]);
        let current = snap(vec![
            Principal::new("keep", "h", true),
            Principal::new("rotate", "new", true),
            Principal::new("lock", "h", false),
            Principal::new("fresh", "h", true),
        ]);

        let delta = compute_delta(Some(&previous), &current);
        assert_eq!(delta.added.keys().collect::<Vec<_>>(), vec!["fresh"]);
        assert_eq!(
            delta.modified.keys().collect::<Vec<_>>(),
            vec!["lock", "rotate"]
        );
        assert_eq!(delta.deleted.iter().collect::<Vec<_>>(), vec!["drop"]);
        assert_eq!(delta.modified["rotate"].hash, "new");
    }

    #[test]
    fn test_expiry_change_is_modification() {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let previous = snap(vec![Principal::new("a", "h", true)]);
        let current = snap(vec![
            Principal::new("a", "h", true).with_valid_until(Some(expiry))
        ]);
        assert_eq!(compute_delta(Some(&previous), &current).modified.len(), 1);
    }

    #[test]
    fn test_observation_time_ignored() {
        let p = Principal::new("a", "h", true);
        let later = p.clone().observed_at(Utc::now() + Duration::minutes(5));
        let delta = compute_delta(Some(&snap(vec![p])), &snap(vec![later]));
        assert!(delta.is_empty());
    }

    #[test]
    fn test_inputs_untouched() {
        let previous = snap(vec![Principal::new("a", "h", true)]);
        let current = snap(vec![Principal::new("b", "h", true)]);
        let (prev_copy, cur_copy) = (previous.clone(), current.clone());
        let _ = compute_delta(Some(&previous), &current);
        assert_eq!(previous, prev_copy);
        assert_eq!(current, cur_copy);
    }

    #[test]
    fn test_sets_pairwise_disjoint() {
        // Every combination of presence and change over a small universe.
        let names = ["a", "b", "c", "d"];
        for mask_prev in 0u8..16 {
            for mask_cur in 0u8..16 {
                for mask_change in 0u8..16 {
                    let previous = snap(
                        names
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| mask_prev & (1 << i) != 0)
                            .map(|(_, n)| Principal::new(*n, "h", true))
                            .collect(),
                    );
                    let current = snap(
                        names
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| mask_cur & (1 << i) != 0)
                            .map(|(i, n)| {
                                let hash = if mask_change & (1 << i) != 0 { "h2" } else { "h" };
                                Principal::new(*n, hash, true)
                            })
                            .collect(),
                    );

                    let delta = compute_delta(Some(&previous), &current);
                    for name in names {
                        let hits = delta.added.contains_key(name) as u8
                            + delta.modified.contains_key(name) as u8
                            + delta.deleted.contains(name) as u8;
                        assert!(hits <= 1, "{} in {} sets", name, hits);
                    }
                }
            }
        }
    }
}
