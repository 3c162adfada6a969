//! Work-channel handler: dedup, reactions, test pings and the simple responders.
mod common;

use common::{
    is_reaction, reply_id_of, settle, taipei_position, test_config, text_packet, FakeChat,
    FakeDirectory, FakeForecast, FixedSelector, RecordingLink, WORK_CHANNEL_ID,
};
use meshgate::config::{Config, DeviceConfig, PacingConfig};
use meshgate::gateway::handler::{HandlerOutcome, MessageHandler, ACK_EMOJI, TEST_ACK_EMOJI};
use meshgate::mesh::emoji_packet;
use meshgate::transport::radio::Transmitter;
use std::sync::Arc;

fn setup(cfg: &Config, directory: Arc<FakeDirectory>) -> (MessageHandler, Arc<RecordingLink>) {
    let link = RecordingLink::new("a");
    let tx = common::transmitter(common::links(&[&link]));
    let h = common::handler(
        cfg,
        tx,
        directory,
        FakeForecast::new(None),
        FakeChat::new(None),
    );
    (h, link)
}

#[tokio::test(start_paused = true)]
async fn help_gets_reaction_and_first_page() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    let outcome = h
        .handle_channel_message(&text_packet(100, 0xdeadbeef, "@nfs.tw help"), WORK_CHANNEL_ID)
        .await;
    assert_eq!(outcome, HandlerOutcome::Command("help"));
    settle().await;

    let reactions = link.reactions();
    assert_eq!(reactions.len(), 1);
    assert_eq!(common::text_of(&reactions[0]), ACK_EMOJI);
    assert_eq!(reply_id_of(&reactions[0]), 100);
    assert!(!reactions[0].want_ack);

    let replies: Vec<_> = link.sent().into_iter().filter(|p| !is_reaction(p)).collect();
    assert_eq!(replies.len(), 1);
    assert!(common::text_of(&replies[0]).starts_with("Meshgate 說明 第1/"));
    assert_eq!(reply_id_of(&replies[0]), 100);
    assert_eq!(replies[0].channel, WORK_CHANNEL_ID);
    assert!(replies[0].want_ack);
}

#[tokio::test(start_paused = true)]
async fn help_with_bad_page_sends_nothing_but_the_reaction() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    let outcome = h
        .handle_channel_message(&text_packet(101, 1, "@nfs help two"), WORK_CHANNEL_ID)
        .await;
    assert_eq!(outcome, HandlerOutcome::Command("help"));
    settle().await;
    assert!(link.texts().is_empty());
    assert_eq!(link.reactions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn help_page_past_the_end_is_clamped() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    h.handle_channel_message(&text_packet(102, 1, "@nfs help 99"), WORK_CHANNEL_ID)
        .await;
    let texts = link.texts();
    assert_eq!(texts.len(), 1);
    let header = texts[0].lines().next().unwrap_or_default().to_string();
    let (page, total) = header
        .split("第")
        .nth(1)
        .and_then(|rest| rest.split('頁').next())
        .and_then(|frac| frac.split_once('/'))
        .expect("page header");
    assert_eq!(page, total);
}

#[tokio::test(start_paused = true)]
async fn duplicate_packet_is_handled_once() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    let p = text_packet(200, 1, "@nfs help");
    assert_eq!(
        h.handle_channel_message(&p, WORK_CHANNEL_ID).await,
        HandlerOutcome::Command("help")
    );
    assert_eq!(
        h.handle_channel_message(&p, WORK_CHANNEL_ID).await,
        HandlerOutcome::Duplicate
    );
    settle().await;
    assert_eq!(link.texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reactions_and_plain_chatter_are_ignored() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    let mut reaction = emoji_packet("👍", WORK_CHANNEL_ID, 5);
    reaction.id = 300;
    reaction.from = 1;
    assert_eq!(
        h.handle_channel_message(&reaction, WORK_CHANNEL_ID).await,
        HandlerOutcome::Emoji
    );
    assert_eq!(
        h.handle_channel_message(&text_packet(301, 1, "good morning all"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::Ignored
    );
    assert_eq!(
        h.handle_channel_message(&text_packet(302, 1, "   "), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::NoText
    );
    settle().await;
    assert!(link.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ping_is_acknowledged_then_silenced() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    assert_eq!(
        h.handle_channel_message(&text_packet(400, 1, "test"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::TestAck
    );
    assert_eq!(
        h.handle_channel_message(&text_packet(401, 2, "測試"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::TestAckSilenced
    );
    let sent = link.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(common::text_of(&sent[0]), TEST_ACK_EMOJI);
    assert_eq!(reply_id_of(&sent[0]), 400);
    assert!(!sent[0].want_ack);

    tokio::time::sleep(std::time::Duration::from_secs(21)).await;
    assert_eq!(
        h.handle_channel_message(&text_packet(402, 2, "testing"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::TestAck
    );
}

#[tokio::test(start_paused = true)]
async fn generic_reply_uses_sender_tag_and_promo() {
    let (h, link) = setup(
        &test_config(),
        FakeDirectory::with(Some("ABCD"), Some(taipei_position())),
    );
    assert_eq!(
        h.handle_channel_message(&text_packet(500, 1, "@nfs"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::Command("generic")
    );
    assert_eq!(
        link.texts(),
        vec!["嗨！ABCD (臺北市大安區)，已收到：\nPROMO".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn sender_tag_falls_back_to_node_id() {
    let (h, link) = setup(&test_config(), FakeDirectory::empty());
    h.handle_channel_message(&text_packet(501, 0xdeadbeef, "@nfs hola"), WORK_CHANNEL_ID)
        .await;
    assert_eq!(
        link.texts(),
        vec!["嗨！!deadbeef，已收到：\nhola\n\nPROMO".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn ab_relay_chains_forward_to_notice() {
    let (h, link) = setup(&test_config(), FakeDirectory::with(Some("ABCD"), None));
    assert_eq!(
        h.handle_channel_message(&text_packet(600, 1, "@nfs ab"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::Command("ab")
    );
    let replies: Vec<_> = link.sent().into_iter().filter(|p| !is_reaction(p)).collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(
        common::text_of(&replies[0]),
        "嗨！ABCD，正在為您呼叫 ARBot 機器人，若未收到回應，請稍後再試。"
    );
    assert_eq!(reply_id_of(&replies[0]), 600);
    assert_eq!(common::text_of(&replies[1]), "@ab test");
    assert_eq!(reply_id_of(&replies[1]), replies[0].id);
}

#[tokio::test(start_paused = true)]
async fn ab_relay_uses_pinned_interface() {
    let mut cfg = test_config();
    cfg.devices = vec![
        DeviceConfig::Tcp {
            name: "a".into(),
            host: "127.0.0.1".into(),
            port: 4403,
        },
        DeviceConfig::Tcp {
            name: "b".into(),
            host: "127.0.0.2".into(),
            port: 4403,
        },
    ];
    cfg.gateway.arbot_interface = Some("b".into());
    cfg.validate().expect("valid");

    let a = RecordingLink::new("a");
    let b = RecordingLink::new("b");
    let tx = Arc::new(Transmitter::with_selector(
        common::links(&[&a, &b]),
        PacingConfig::immediate(),
        Arc::new(FixedSelector(0)),
    ));
    let h = common::handler(
        &cfg,
        tx,
        FakeDirectory::empty(),
        FakeForecast::new(None),
        FakeChat::new(None),
    );
    h.handle_channel_message(&text_packet(601, 1, "@nfs ab ping 2"), WORK_CHANNEL_ID)
        .await;
    settle().await;

    assert!(a.texts().is_empty());
    assert_eq!(b.texts().len(), 2);
    assert_eq!(b.texts()[1], "@ab ping 2");
    // the immediate reaction is not pinned
    assert_eq!(a.reactions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ai_disabled_sends_notice() {
    let mut cfg = test_config();
    cfg.ai.enabled = false;
    let (h, link) = setup(&cfg, FakeDirectory::empty());
    assert_eq!(
        h.handle_channel_message(&text_packet(700, 1, "@nfs ai hi"), WORK_CHANNEL_ID)
            .await,
        HandlerOutcome::Command("ai")
    );
    assert_eq!(
        link.texts(),
        vec!["嗨！!00000001，AI 助理目前未啟用。".to_string()]
    );
}
