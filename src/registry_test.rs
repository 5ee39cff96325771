use super::*;

fn user(id: &str, name: &str) -> UserInfo {
    UserInfo {
        id: id.to_owned(),
        name: name.to_owned(),
        avatar: None,
        color: None,
        role: None,
    }
}

fn registry() -> ParticipantRegistry {
    ParticipantRegistry::new("me")
}

#[test]
fn join_inserts_remote_participant() {
    let mut reg = registry();
    let JoinOutcome::Inserted(p) = reg.join(user("u2", "Ada"), 10) else {
        panic!("expected insert");
    };
    assert_eq!(p.id, "u2");
    assert!(p.cursor.is_none());
    assert!(p.selected_ids.is_empty());
    assert!(p.color.starts_with('#') && p.color.len() == 7);
    assert_eq!(reg.len(), 1);
}

#[test]
fn join_ignores_local_user() {
    let mut reg = registry();
    assert_eq!(reg.join(user("me", "Self"), 10), JoinOutcome::IgnoredLocal);
    assert!(reg.is_empty());
}

#[test]
fn rejoin_refreshes_identity_and_keeps_cursor() {
    let mut reg = registry();
    reg.join(user("u2", "Ada"), 10);
    reg.update("u2", Some(Point::new(3.0, 4.0)), None, 11);

    let mut renamed = user("u2", "Ada L.");
    renamed.role = Some("editor".to_owned());
    assert_eq!(reg.join(renamed, 12), JoinOutcome::Refreshed);

    let p = reg.get("u2").expect("participant");
    assert_eq!(p.name, "Ada L.");
    assert_eq!(p.role.as_deref(), Some("editor"));
    assert_eq!(p.cursor, Some(Point::new(3.0, 4.0)));
}

#[test]
fn explicit_color_is_normalized() {
    let mut reg = registry();
    let mut u = user("u2", "Ada");
    u.color = Some("#F0A".to_owned());
    reg.join(u, 0);
    assert_eq!(reg.get("u2").expect("participant").color, "#ff00aa");
}

#[test]
fn palette_color_is_stable_per_id() {
    let mut a = registry();
    let mut b = registry();
    a.join(user("peer-42", "A"), 0);
    b.join(user("peer-42", "B"), 0);
    assert_eq!(a.get("peer-42").map(|p| &p.color), b.get("peer-42").map(|p| &p.color));
}

#[test]
fn update_changes_only_present_fields() {
    let mut reg = registry();
    reg.join(user("u2", "Ada"), 0);
    reg.update("u2", None, Some(vec!["w1".to_owned(), "w2".to_owned()]), 1);
    let change = reg.update("u2", Some(Point::new(1.0, 2.0)), None, 2).expect("known peer");

    assert_eq!(change.cursor, Some(Point::new(1.0, 2.0)));
    assert!(change.selected_ids.is_none());
    let p = reg.get("u2").expect("participant");
    assert_eq!(p.selected_ids.len(), 2, "selection left unchanged");
    assert_eq!(p.last_seen_ms, 2);
}

#[test]
fn update_for_unknown_participant_is_a_no_op() {
    let mut reg = registry();
    assert!(reg.update("ghost", Some(Point::new(1.0, 1.0)), None, 0).is_none());
    assert!(reg.is_empty());
}

#[test]
fn update_for_local_user_is_ignored() {
    let mut reg = registry();
    assert!(reg.update("me", Some(Point::new(1.0, 1.0)), None, 0).is_none());
}

#[test]
fn leave_removes_participant() {
    let mut reg = registry();
    reg.join(user("u2", "Ada"), 0);
    assert!(reg.leave("u2").is_some());
    assert!(reg.leave("u2").is_none());
    assert!(reg.is_empty());
}

#[test]
fn clear_drops_everyone() {
    let mut reg = registry();
    reg.join(user("u2", "Ada"), 0);
    reg.join(user("u3", "Bob"), 0);
    assert_eq!(reg.clear(), 2);
    assert!(reg.snapshot().is_empty());
}

#[test]
fn snapshot_is_sorted_by_name() {
    let mut reg = registry();
    reg.join(user("u3", "Zed"), 0);
    reg.join(user("u2", "Ada"), 0);
    let names: Vec<_> = reg.snapshot().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Ada", "Zed"]);
}

#[test]
fn normalize_falls_back_on_garbage() {
    assert_eq!(normalize_hex_color("teal", "#123456"), "#123456");
    assert_eq!(normalize_hex_color("#ABCDEF", "#000"), "#abcdef");
}
