use std::sync::{Arc, Mutex};

use super::*;

#[test]
fn event_serializes_with_name_tag() {
    let event = CollabEvent::Reconnecting {
        attempt: 2,
        delay_ms: 2000,
    };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["event"], "reconnecting");
    assert_eq!(json["delayMs"], 2000);
    assert_eq!(event.name(), "reconnecting");
}

#[test]
fn widget_event_flattens_change() {
    let event = WidgetEvent {
        canvas_id: Some("c1".to_owned()),
        user_id: Some("u2".to_owned()),
        timestamp: None,
        change: WidgetChange::Moved {
            widget_id: "w1".to_owned(),
            position: Point::new(10.0, 20.0),
        },
    };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["action"], "moved");
    assert_eq!(json["widgetId"], "w1");
    assert_eq!(json["canvasId"], "c1");
    assert_eq!(json["position"]["x"], 10.0);
    assert_eq!(event.bus_name(), "collaboration:widget:moved");
}

#[test]
fn widget_event_nests_under_its_own_key() {
    let event = CollabEvent::Widget {
        widget: WidgetEvent {
            canvas_id: Some("c1".to_owned()),
            user_id: Some("u2".to_owned()),
            timestamp: Some(42),
            change: WidgetChange::Deleted {
                widget_id: "w9".to_owned(),
            },
        },
    };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["event"], "widget");
    assert_eq!(json["widget"]["action"], "deleted");
    assert_eq!(json["widget"]["widgetId"], "w9");
    assert_eq!(json["widget"]["userId"], "u2");
    assert_eq!(event.name(), "widget");
}

#[test]
fn state_change_bus_name() {
    let event = WidgetEvent {
        canvas_id: None,
        user_id: None,
        timestamp: None,
        change: WidgetChange::StateChanged {
            widget_id: "w1".to_owned(),
            state: serde_json::json!({ "checked": true }),
            partial: true,
        },
    };
    assert_eq!(event.bus_name(), "collaboration:widget:state");
}

#[tokio::test]
async fn listener_receives_until_unsubscribed() {
    let (tx, _keep) = broadcast::channel(8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = spawn_listener(tx.subscribe(), move |event| {
        sink.lock().expect("lock").push(event.name());
    });

    tx.send(CollabEvent::Connected).expect("send");
    tx.send(CollabEvent::Heartbeat { at_ms: 1 }).expect("send");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(*seen.lock().expect("lock"), vec!["connected", "heartbeat"]);
    assert!(sub.is_active());

    sub.unsubscribe();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let _ = tx.send(CollabEvent::Connected);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(seen.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn listener_stops_when_sender_is_dropped() {
    let (tx, rx) = broadcast::channel::<CollabEvent>(4);
    let sub = spawn_listener(rx, |_| {});
    drop(tx);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!sub.is_active());
}
