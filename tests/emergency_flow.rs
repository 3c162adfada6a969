//! Emergency guardian: admission order, notification text and advisory chaining.
mod common;

use common::{
    reply_id_of, taipei_position, test_config, text_packet, FailingLink, FakeDirectory,
    RecordingLink, NOTIFY_CHANNEL_ID,
};
use meshgate::config::EmergencyConfig;
use meshgate::gateway::emergency::{
    format_timestamp, EmergencyAlert, EmergencyGuardian, EmergencyOutcome, ADVISORY_TEXT,
};
use meshgate::mesh::emoji_packet;
use meshgate::transport::radio::{RadioLink, Transmitter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn emergency_config() -> EmergencyConfig {
    test_config().emergency.expect("emergency configured")
}

fn guardian(directory: Arc<FakeDirectory>) -> (Arc<EmergencyGuardian>, Arc<RecordingLink>) {
    let link = RecordingLink::new("a");
    let tx = common::transmitter(common::links(&[&link]));
    let g = EmergencyGuardian::new(&emergency_config(), Duration::from_secs(600), tx, directory);
    (Arc::new(g), link)
}

fn alert(text: &str) -> EmergencyAlert {
    EmergencyAlert {
        packet_id: 77,
        from: 0xdeadbeef,
        channel: "Guardian".into(),
        text: text.into(),
    }
}

#[tokio::test(start_paused = true)]
async fn notification_then_advisory() {
    let (g, link) = guardian(FakeDirectory::with(None, Some(taipei_position())));
    let sent = g.notify(&alert("救命")).await.expect("notification sent");

    let packets = link.sent();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].id, sent.id);
    assert_eq!(packets[0].channel, NOTIFY_CHANNEL_ID);
    assert!(packets[0].want_ack);
    assert_eq!(reply_id_of(&packets[0]), 0);
    assert_eq!(
        common::text_of(&packets[0]),
        "🆘 @here 緊急守護通報/Guardian(!deadbeef)\n\
         臺北市大安區羅斯福路四段1號(LongFast/精度350m/03-01 08:30)\n\
         內容：救命"
    );
    assert_eq!(common::text_of(&packets[1]), ADVISORY_TEXT);
    assert_eq!(reply_id_of(&packets[1]), sent.id);
    assert_eq!(packets[1].channel, NOTIFY_CHANNEL_ID);
}

#[tokio::test(start_paused = true)]
async fn unknown_position_omits_address_line() {
    let (g, link) = guardian(FakeDirectory::empty());
    g.notify(&alert("救命")).await.expect("sent");
    assert_eq!(
        common::text_of(&link.sent()[0]),
        "🆘 @here 緊急守護通報/Guardian(!deadbeef)\n內容：救命"
    );
}

#[tokio::test(start_paused = true)]
async fn failed_notification_skips_advisory() {
    let dead = FailingLink::new("dead");
    let tx = Arc::new(Transmitter::new(
        vec![dead.clone() as Arc<dyn RadioLink>],
        meshgate::config::PacingConfig::immediate(),
    ));
    let g = EmergencyGuardian::new(
        &emergency_config(),
        Duration::from_secs(600),
        tx,
        FakeDirectory::empty(),
    );
    assert!(g.notify(&alert("救命")).await.is_none());
    assert_eq!(dead.attempts().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn silence_is_checked_before_dedup() {
    let (g, _link) = guardian(FakeDirectory::empty());
    let t0 = Instant::now();
    let first = text_packet(1, 0xdeadbeef, "救命");
    assert!(matches!(
        g.admit(&first, "Guardian", t0),
        EmergencyOutcome::Admitted(_)
    ));
    assert_eq!(
        g.admit(&text_packet(2, 0xdeadbeef, "再次"), "Guardian", t0 + Duration::from_secs(10)),
        EmergencyOutcome::Silenced
    );
    assert_eq!(
        g.admit(&first, "Guardian", t0 + Duration::from_secs(181)),
        EmergencyOutcome::Duplicate
    );
    match g.admit(&text_packet(3, 0xdeadbeef, "又來"), "Guardian", t0 + Duration::from_secs(400)) {
        EmergencyOutcome::Admitted(a) => {
            assert_eq!(a.packet_id, 3);
            assert_eq!(a.channel, "Guardian");
            assert_eq!(a.text, "又來");
        }
        other => panic!("expected admission, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn reactions_and_blank_text_are_not_alerts() {
    let (g, _) = guardian(FakeDirectory::empty());
    let mut reaction = emoji_packet("👍", 0, 9);
    reaction.id = 50;
    assert_eq!(
        g.admit(&reaction, "Guardian", Instant::now()),
        EmergencyOutcome::Emoji
    );

    let (g, _) = guardian(FakeDirectory::empty());
    assert_eq!(
        g.admit(&text_packet(51, 1, "  "), "Guardian", Instant::now()),
        EmergencyOutcome::NoText
    );
}

#[tokio::test(start_paused = true)]
async fn handle_admits_inline_and_notifies_in_background() {
    let (g, link) = guardian(FakeDirectory::empty());
    let outcome = g.handle(&text_packet(60, 0xdeadbeef, "火災"), "Guardian");
    assert!(matches!(outcome, EmergencyOutcome::Admitted(_)));
    common::settle().await;
    let texts = link.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].ends_with("內容：火災"));
    assert_eq!(texts[1], ADVISORY_TEXT);
}

#[test]
fn timestamps_render_compactly() {
    assert_eq!(
        format_timestamp(&Value::from("2025-03-01T08:30:00+08:00")),
        "03-01 08:30 +08:00"
    );
    assert_eq!(
        format_timestamp(&Value::from("2025-03-01T08:30:00.250")),
        "03-01 08:30"
    );
    assert_eq!(format_timestamp(&Value::from("yesterday")), "yesterday");
    assert_eq!(format_timestamp(&Value::Bool(true)), "true");
}
