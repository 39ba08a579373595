//! Property-Based Tests for the Cache Partitions and Progress Merges
//!
//! - Clearing user data never touches catalog entries, and clearing the cache
//!   never drops user entries.
//! - Progress produced by any sequence of completions agrees with its own
//!   completed set, and repeating a completion changes nothing.

use lectern_store::{Repositories, StoreConfig};
use lectern_test_utils::generators::*;
use lectern_test_utils::*;
use proptest::prelude::*;

fn repositories() -> Repositories {
    let (store, _) = fixtures::manual_store(StoreConfig::new().with_persist_on_write(false));
    Repositories::new(store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_clearing_respects_partitions(
        courses in prop::collection::vec(arb_course(), 1..8),
        users in prop::collection::vec(arb_user_id(), 1..4),
    ) {
        let repos = repositories();
        for course in &courses {
            repos.courses.set(&course.id, course.clone());
        }
        for user in &users {
            for course in &courses {
                repos.record_last_viewed(user, &course.id, &LessonId::new("l1"));
            }
        }
        let catalog_len = repos.store().keys().iter().filter(|k| k.is_catalog()).count();
        let user_len = repos.store().len() - catalog_len;

        let cleared = repos.store().clear_user_data();
        prop_assert_eq!(cleared, user_len);
        prop_assert_eq!(repos.store().len(), catalog_len);
        for course in &courses {
            prop_assert!(repos.courses.get(&course.id).is_some());
        }

        for user in &users {
            repos.record_last_viewed(user, &courses[0].id, &LessonId::new("l2"));
        }
        let cleared = repos.store().clear_cache();
        prop_assert_eq!(cleared, catalog_len);
        prop_assert!(repos.store().keys().iter().all(|k| !k.is_catalog()));
        for user in &users {
            prop_assert!(repos.last_viewed.get(user, &courses[0].id).is_some());
            prop_assert!(repos.last_viewed.is_stale(user, &courses[0].id, None));
        }
    }

    #[test]
    fn prop_progress_matches_completed_set(
        lessons in arb_lessons(CourseId::new("c1"), 20),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..30),
    ) {
        let repos = repositories();
        let user = UserId::new("u1");
        let course = CourseId::new("c1");

        let mut last = None;
        for pick in &picks {
            if lessons.is_empty() {
                break;
            }
            let lesson = &lessons[pick.index(lessons.len())];
            let progress = repos.mark_lesson_complete(&user, &course, &lesson.id, Some(lessons.as_slice()));
            assertions::assert_progress_consistent(&progress);
            prop_assert!(progress.completed_lessons.contains(&lesson.id));

            let again = repos.mark_lesson_complete(&user, &course, &lesson.id, Some(lessons.as_slice()));
            prop_assert_eq!(&again, &progress);
            last = Some(progress);
        }

        if let Some(progress) = last {
            prop_assert_eq!(progress.total_lessons, lessons.len());
            prop_assert!(progress.completed_lessons.len() <= lessons.len());
            prop_assert_eq!(
                progress.is_completed(),
                progress.completed_lessons.len() == lessons.len()
            );
        }
    }
}
