//! Integration tests for the user supervision graph.
//!
//! Covers edge creation and removal from both ends, listing in both
//! directions, cleanup when a user is deleted, and behavior under
//! concurrent writers.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use task_manager::db::Database;
use task_manager::error::{ApiError, ErrorCode, api_error};
use task_manager::types::{NewTask, NewUser, User, UserRole};

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn create_user(db: &Database, username: &str) -> User {
    db.create_user(NewUser {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "hash".to_string(),
        role: UserRole::User,
    })
    .expect("Failed to create user")
}

fn error_code(err: anyhow::Error) -> ErrorCode {
    api_error(&err)
        .map(|e| e.code)
        .unwrap_or_else(|| panic!("expected an ApiError, got: {:#}", err))
}

fn ids(users: &[User]) -> HashSet<String> {
    users.iter().map(|u| u.id.clone()).collect()
}

mod add_edge_tests {
    use super::*;

    #[test]
    fn add_then_list_both_directions() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let parent = db.add_edge(&alice.id, &bob.id).unwrap();
        assert_eq!(parent.user.id, alice.id);
        assert_eq!(ids(&parent.children), HashSet::from([bob.id.clone()]));

        let children = db.list_children(&alice.id).unwrap();
        assert_eq!(ids(&children), HashSet::from([bob.id.clone()]));

        let parents = db.list_parents(&bob.id).unwrap();
        assert_eq!(ids(&parents), HashSet::from([alice.id.clone()]));

        assert!(db.list_parents(&alice.id).unwrap().is_empty());
        assert!(db.list_children(&bob.id).unwrap().is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        db.add_edge(&alice.id, &bob.id).unwrap();
        let again = db.add_edge(&alice.id, &bob.id).unwrap();

        assert_eq!(again.children.len(), 1);
        assert_eq!(db.list_children(&alice.id).unwrap().len(), 1);
        assert_eq!(db.list_parents(&bob.id).unwrap().len(), 1);
        assert_eq!(db.list_edges().unwrap().len(), 1);
    }

    #[test]
    fn missing_parent_is_reported_before_child() {
        let db = setup_db();
        let err = db.add_edge("ghost-parent", "ghost-child").unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ParentNotFound);
    }

    #[test]
    fn missing_child_is_reported() {
        let db = setup_db();
        let alice = create_user(&db, "alice");

        let err = db.add_edge(&alice.id, "nonexistent-id").unwrap_err();
        let api = ApiError::from(err);
        assert_eq!(api.code, ErrorCode::ChildNotFound);
        assert!(api.message.contains("nonexistent-id"));
        assert!(db.list_children(&alice.id).unwrap().is_empty());
    }

    #[test]
    fn self_relation_is_rejected() {
        let db = setup_db();
        let alice = create_user(&db, "alice");

        let err = db.add_edge(&alice.id, &alice.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::InvalidArgument);
        assert!(db.list_edges().unwrap().is_empty());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let db = setup_db();
        let alice = create_user(&db, "alice");

        let err = db.add_edge("", &alice.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::MissingRequiredField);

        let err = db.add_edge(&alice.id, "has space").unwrap_err();
        assert_eq!(error_code(err), ErrorCode::InvalidArgument);

        let long = "x".repeat(65);
        let err = db.add_edge(&alice.id, &long).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::InvalidArgument);
    }

    #[test]
    fn two_cycle_is_allowed() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        db.add_edge(&alice.id, &bob.id).unwrap();
        db.add_edge(&bob.id, &alice.id).unwrap();

        assert!(db.has_edge(&alice.id, &bob.id).unwrap());
        assert!(db.has_edge(&bob.id, &alice.id).unwrap());
        assert_eq!(ids(&db.list_parents(&alice.id).unwrap()), HashSet::from([bob.id.clone()]));
    }

    #[test]
    fn child_may_have_many_parents() {
        let db = setup_db();
        let p1 = create_user(&db, "parent1");
        let p2 = create_user(&db, "parent2");
        let child = create_user(&db, "child");

        db.add_edge(&p1.id, &child.id).unwrap();
        db.add_edge(&p2.id, &child.id).unwrap();

        let parents = db.list_parents(&child.id).unwrap();
        assert_eq!(ids(&parents), HashSet::from([p1.id.clone(), p2.id.clone()]));
    }

    #[test]
    fn listing_is_a_snapshot() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");

        db.add_edge(&alice.id, &bob.id).unwrap();
        let snapshot = db.list_children(&alice.id).unwrap();

        db.add_edge(&alice.id, &carol.id).unwrap();
        db.remove_edge(&alice.id, &bob.id).unwrap();

        assert_eq!(ids(&snapshot), HashSet::from([bob.id.clone()]));
        assert_eq!(ids(&db.list_children(&alice.id).unwrap()), HashSet::from([carol.id.clone()]));
    }
}

mod remove_edge_tests {
    use super::*;

    #[test]
    fn remove_from_parent_side_updates_both_directions() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        db.add_edge(&alice.id, &bob.id).unwrap();

        let parent = db.remove_edge(&alice.id, &bob.id).unwrap();
        assert_eq!(parent.user.id, alice.id);
        assert!(parent.children.is_empty());
        assert!(db.list_parents(&bob.id).unwrap().is_empty());
    }

    #[test]
    fn remove_from_child_side_updates_both_directions() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        db.add_edge(&alice.id, &bob.id).unwrap();

        let child = db.remove_parent_from_child(&bob.id, &alice.id).unwrap();
        assert_eq!(child.user.id, bob.id);
        assert!(child.parents.is_empty());
        assert!(db.list_children(&alice.id).unwrap().is_empty());
    }

    #[test]
    fn both_removal_forms_leave_the_same_state() {
        let linked = || {
            let db = setup_db();
            let alice = create_user(&db, "alice");
            let bob = create_user(&db, "bob");
            db.add_edge(&alice.id, &bob.id).unwrap();
            (db, alice, bob)
        };

        let (db_a, a_alice, a_bob) = linked();
        let (db_b, b_alice, b_bob) = linked();

        db_a.remove_edge(&a_alice.id, &a_bob.id).unwrap();
        db_b.remove_parent_from_child(&b_bob.id, &b_alice.id).unwrap();

        for (db, alice, bob) in [(&db_a, &a_alice, &a_bob), (&db_b, &b_alice, &b_bob)] {
            assert!(db.list_edges().unwrap().is_empty());
            assert!(db.list_children(&alice.id).unwrap().is_empty());
            assert!(db.list_parents(&bob.id).unwrap().is_empty());
        }
    }

    #[test]
    fn removing_a_missing_edge_reports_relationship() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let err = db.remove_edge(&alice.id, &bob.id).unwrap_err();
        let api = ApiError::from(err);
        assert_eq!(api.code, ErrorCode::RelationshipNotFound);
        assert!(api.message.contains(&bob.id));
        assert!(api.message.contains(&alice.id));

        let err = db.remove_parent_from_child(&bob.id, &alice.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::RelationshipNotFound);
    }

    #[test]
    fn removing_twice_fails_the_second_time() {
        let db = setup_db();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        db.add_edge(&alice.id, &bob.id).unwrap();

        db.remove_edge(&alice.id, &bob.id).unwrap();
        let err = db.remove_edge(&alice.id, &bob.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::RelationshipNotFound);
    }

    #[test]
    fn remove_with_unknown_endpoint() {
        let db = setup_db();
        let alice = create_user(&db, "alice");

        let err = db.remove_edge("ghost", &alice.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ParentNotFound);

        let err = db.remove_parent_from_child("ghost", &alice.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ChildNotFound);

        // Edge to an unknown child simply does not exist
        let err = db.remove_edge(&alice.id, "ghost").unwrap_err();
        assert_eq!(error_code(err), ErrorCode::RelationshipNotFound);
    }

    #[test]
    fn listing_unknown_user_is_not_found() {
        let db = setup_db();
        assert_eq!(error_code(db.list_children("ghost").unwrap_err()), ErrorCode::UserNotFound);
        assert_eq!(error_code(db.list_parents("ghost").unwrap_err()), ErrorCode::UserNotFound);
    }
}

mod cascade_tests {
    use super::*;

    #[test]
    fn deleting_a_user_clears_every_edge_touching_it() {
        let db = setup_db();
        let p = create_user(&db, "parent");
        let u = create_user(&db, "middle");
        let c = create_user(&db, "child");
        let other = create_user(&db, "other");

        db.add_edge(&p.id, &u.id).unwrap();
        db.add_edge(&u.id, &c.id).unwrap();
        db.add_edge(&p.id, &other.id).unwrap();

        db.delete_user(&u.id).unwrap();

        assert_eq!(ids(&db.list_children(&p.id).unwrap()), HashSet::from([other.id.clone()]));
        assert!(db.list_parents(&c.id).unwrap().is_empty());
        assert!(
            db.list_edges()
                .unwrap()
                .iter()
                .all(|e| e.parent_id != u.id && e.child_id != u.id)
        );
        assert!(db.get_user(&u.id).unwrap().is_none());
    }

    #[test]
    fn deleted_user_can_no_longer_be_linked() {
        let db = setup_db();
        let u = create_user(&db, "gone");
        let c = create_user(&db, "child");
        db.delete_user(&u.id).unwrap();

        let err = db.add_edge(&u.id, &c.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ParentNotFound);

        let err = db.add_edge(&c.id, &u.id).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ChildNotFound);
    }

    #[test]
    fn failed_delete_rolls_back_cleared_edges() {
        let db = setup_db();
        let p = create_user(&db, "parent");
        let u = create_user(&db, "middle");
        let c = create_user(&db, "child");
        db.add_edge(&p.id, &u.id).unwrap();
        db.add_edge(&u.id, &c.id).unwrap();
        let before = db.list_edges().unwrap();

        // Fails the row delete after the edges have already been cleared
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_user_delete BEFORE DELETE ON users
                 BEGIN SELECT RAISE(ABORT, 'user deletion blocked'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.delete_user(&u.id).unwrap_err();
        assert!(api_error(&err).is_none());
        assert_eq!(ApiError::from(err).code, ErrorCode::DatabaseError);

        assert_eq!(db.list_edges().unwrap(), before);
        assert!(db.user_exists(&u.id).unwrap());
        assert_eq!(ids(&db.list_children(&p.id).unwrap()), HashSet::from([u.id.clone()]));
    }

    #[test]
    fn deleting_an_unknown_user_is_not_found() {
        let db = setup_db();
        let err = db.delete_user("ghost").unwrap_err();
        assert_eq!(error_code(err), ErrorCode::UserNotFound);
    }

    #[test]
    fn deleting_a_user_detaches_their_tasks() {
        let db = setup_db();
        let u = create_user(&db, "owner");
        db.create_task(
            &u.id,
            NewTask {
                title: "Write report".to_string(),
                description: "Quarterly numbers".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        db.delete_user(&u.id).unwrap();

        let orphans = db.list_ownerless_tasks().unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].title, "Write report");
        assert!(orphans[0].owner_id.is_none());
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn family_lifecycle() {
        let db = setup_db();
        let u1 = create_user(&db, "user1");
        let u2 = create_user(&db, "user2");
        let u3 = create_user(&db, "user3");

        db.add_edge(&u1.id, &u2.id).unwrap();
        db.add_edge(&u1.id, &u3.id).unwrap();
        db.add_edge(&u2.id, &u3.id).unwrap();

        assert_eq!(
            ids(&db.list_children(&u1.id).unwrap()),
            HashSet::from([u2.id.clone(), u3.id.clone()])
        );
        assert_eq!(
            ids(&db.list_parents(&u3.id).unwrap()),
            HashSet::from([u1.id.clone(), u2.id.clone()])
        );

        db.remove_parent_from_child(&u3.id, &u1.id).unwrap();
        assert_eq!(ids(&db.list_children(&u1.id).unwrap()), HashSet::from([u2.id.clone()]));
        assert_eq!(ids(&db.list_parents(&u3.id).unwrap()), HashSet::from([u2.id.clone()]));

        db.delete_user(&u2.id).unwrap();
        assert!(db.list_children(&u1.id).unwrap().is_empty());
        assert!(db.list_parents(&u3.id).unwrap().is_empty());
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn concurrent_adds_on_shared_handle_all_land() {
        let db = Arc::new(setup_db());
        let parent = create_user(&db, "parent");
        let children: Vec<User> = (0..16)
            .map(|i| create_user(&db, &format!("child{:02}", i)))
            .collect();

        let handles: Vec<_> = children
            .iter()
            .map(|child| {
                let db = Arc::clone(&db);
                let parent_id = parent.id.clone();
                let child_id = child.id.clone();
                thread::spawn(move || db.add_edge(&parent_id, &child_id).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(ids(&db.list_children(&parent.id).unwrap()), ids(&children));
        for child in &children {
            assert_eq!(ids(&db.list_parents(&child.id).unwrap()), HashSet::from([parent.id.clone()]));
        }
    }

    #[test]
    fn concurrent_adds_across_connections_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let db = Database::open(&path).unwrap();
        let parent = create_user(&db, "parent");
        let children: Vec<User> = (0..12)
            .map(|i| create_user(&db, &format!("child{:02}", i)))
            .collect();

        let handles: Vec<_> = children
            .chunks(4)
            .map(|chunk| {
                let path = path.clone();
                let parent_id = parent.id.clone();
                let child_ids: Vec<String> = chunk.iter().map(|c| c.id.clone()).collect();
                thread::spawn(move || {
                    let conn = Database::open(&path).unwrap();
                    for child_id in child_ids {
                        conn.add_edge(&parent_id, &child_id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ids(&db.list_children(&parent.id).unwrap()), ids(&children));
    }

    #[test]
    fn add_racing_delete_never_leaves_dangling_edges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let deleter = Database::open(&path).unwrap();
        let adder = Arc::new(Database::open(&path).unwrap());

        for round in 0..30 {
            let a = create_user(&deleter, &format!("doomed{:02}", round));
            let b = create_user(&deleter, &format!("kept{:02}", round));

            let handle = {
                let adder = Arc::clone(&adder);
                let (a_id, b_id) = (a.id.clone(), b.id.clone());
                thread::spawn(move || adder.add_edge(&a_id, &b_id).map(|_| ()))
            };
            deleter.delete_user(&a.id).unwrap();

            match handle.join().unwrap() {
                Ok(()) => {}
                Err(err) => assert_eq!(error_code(err), ErrorCode::ParentNotFound),
            }

            let edges = deleter.list_edges().unwrap();
            assert!(
                edges.iter().all(|e| e.parent_id != a.id && e.child_id != a.id),
                "round {}: edge to deleted user survived",
                round
            );
            assert!(adder.list_parents(&b.id).unwrap().is_empty());
        }
    }

    #[test]
    fn concurrent_add_and_remove_of_same_edge_stay_symmetric() {
        let db = Arc::new(setup_db());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = Arc::clone(&db);
                let (a, b) = (alice.id.clone(), bob.id.clone());
                thread::spawn(move || {
                    for _ in 0..10 {
                        if i % 2 == 0 {
                            let _ = db.add_edge(&a, &b);
                        } else {
                            let _ = db.remove_parent_from_child(&b, &a);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let forward = db
            .list_children(&alice.id)
            .unwrap()
            .iter()
            .any(|u| u.id == bob.id);
        let backward = db
            .list_parents(&bob.id)
            .unwrap()
            .iter()
            .any(|u| u.id == alice.id);
        assert_eq!(forward, backward);
        assert!(db.list_edges().unwrap().len() <= 1);
    }
}
