//! End-to-end flows across the store, driven only through the public API.

use parley_db::messages::DELETED_PLACEHOLDER;
use parley_db::presence::ONLINE_WINDOW_MS;
use parley_db::{ChatError, Database};

fn register(db: &Database, subject: &str, name: &str) -> String {
    db.upsert_user(subject, name, &format!("{}@example.com", name), "", 0)
        .unwrap()
}

#[test]
fn direct_message_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let ana = register(&db, "auth|a", "ana");
    let ben = register(&db, "auth|b", "ben");

    // A opens a conversation with new user B and says hi
    let conv = db.get_or_create_direct(Some("auth|a"), &ben, 1_000).unwrap();
    assert!(conv.created);
    let hi = db.send_message(Some("auth|a"), &conv.id, "hi", 2_000).unwrap();

    let b_list = db.list_conversations(Some("auth|b")).unwrap();
    assert_eq!(b_list.len(), 1);
    assert_eq!(b_list[0].unread_count, 1);
    assert_eq!(b_list[0].last_message.as_ref().unwrap().content, "hi");

    // B reads it
    db.mark_seen(Some("auth|b"), &conv.id).unwrap();
    assert_eq!(db.list_conversations(Some("auth|b")).unwrap()[0].unread_count, 0);

    // New messages from A raise the count again, B's own do not
    db.send_message(Some("auth|b"), &conv.id, "hello!", 3_000).unwrap();
    db.send_message(Some("auth|a"), &conv.id, "how are you", 4_000).unwrap();
    assert_eq!(db.list_conversations(Some("auth|b")).unwrap()[0].unread_count, 1);

    // A deletes the first message: B sees the placeholder, never "hi"
    db.delete_message(Some("auth|a"), &hi.id).unwrap();
    let b_messages = db.list_messages(Some("auth|b"), &conv.id).unwrap();
    assert_eq!(b_messages.len(), 3);
    assert_eq!(b_messages[0].content, DELETED_PLACEHOLDER);
    assert!(b_messages.iter().all(|m| m.content != "hi"));

    // Opening the conversation from B's side lands on the same one
    let reverse = db.get_or_create_direct(Some("auth|b"), &ana, 5_000).unwrap();
    assert_eq!(reverse.id, conv.id);
    assert!(!reverse.created);
}

#[test]
fn group_needs_two_others() {
    let db = Database::open_in_memory().unwrap();
    register(&db, "auth|a", "ana");
    let ben = register(&db, "auth|b", "ben");
    let cal = register(&db, "auth|c", "cal");

    let err = db
        .create_group(Some("auth|a"), &[ben.clone()], "Team", 0)
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidInput(_)));

    let team = db
        .create_group(Some("auth|a"), &[ben, cal], "Team", 0)
        .unwrap();
    for subject in ["auth|a", "auth|b", "auth|c"] {
        let list = db.list_conversations(Some(subject)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id.to_string(), team);
        assert_eq!(list[0].member_count, 3);
        assert_eq!(list[0].other_members.len(), 2);
    }
}

#[test]
fn presence_expires_without_deregistration() {
    let db = Database::open_in_memory().unwrap();
    let ana = register(&db, "auth|a", "ana");

    db.heartbeat(Some("auth|a"), 0).unwrap();
    assert!(db.list_online(ONLINE_WINDOW_MS - 1).unwrap().contains(&ana));
    assert!(!db.list_online(ONLINE_WINDOW_MS).unwrap().contains(&ana));
}

#[test]
fn unread_survives_dangling_pointer() {
    let db = Database::open_in_memory().unwrap();
    register(&db, "auth|a", "ana");
    let ben = register(&db, "auth|b", "ben");
    let conv = db.get_or_create_direct(Some("auth|a"), &ben, 0).unwrap().id;

    db.send_message(Some("auth|a"), &conv, "one", 1).unwrap();
    db.mark_seen(Some("auth|b"), &conv).unwrap();
    db.send_message(Some("auth|a"), &conv, "two", 2).unwrap();
    assert_eq!(db.compute_unread(&conv, &ben).unwrap(), 1);

    // Point B's high-water mark at something that no longer exists
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE conversation_members SET last_seen_message_id = 'gone' WHERE user_id = ?1",
            [&ben],
        )?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.compute_unread(&conv, &ben).unwrap(), 2);
}

#[test]
fn failed_mutation_leaves_no_trace() {
    let db = Database::open_in_memory().unwrap();
    register(&db, "auth|a", "ana");
    let ben = register(&db, "auth|b", "ben");

    assert!(db
        .create_group(Some("auth|a"), &[ben, "ghost".to_string()], "Team", 0)
        .is_err());
    assert!(db.list_conversations(Some("auth|a")).unwrap().is_empty());
}
