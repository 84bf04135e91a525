use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tame_ads::{
    Binding, ChannelState, Client, ClientConfig, Completion, Field, HostStore, Language,
    LoopbackTransport, Method, PlcType, RequestOptions, Result, Slot, StructDefinition, TameError,
    Transport, TransportReply, TransportRequest, Value,
};

fn config() -> ClientConfig {
    ClientConfig::new(
        "http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll",
        "192.168.1.10.1.1",
    )
}

fn loopback_client() -> (Client<LoopbackTransport>, LoopbackTransport) {
    let loopback = LoopbackTransport::new();
    let client = Client::new(config(), loopback.clone()).unwrap();
    (client, loopback)
}

async fn wait_for_calls(loopback: &LoopbackTransport, n: usize) {
    while loopback.calls() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_busy_channel_drops_until_forced_reset() {
    let loopback = LoopbackTransport::gated();
    let client = Arc::new(Client::new(config(), loopback.clone()).unwrap());

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.read_int(RequestOptions::at("%MB0").with_id(7)).await }
    });
    wait_for_calls(&loopback, 1).await;

    for drops in 1..=10 {
        let completion = client
            .read_int(RequestOptions::at("%MB0").with_id(7))
            .await
            .unwrap();
        assert_eq!(completion, Completion::Dropped { channel: 7, drops });
    }
    assert_eq!(
        client.channel_state(7),
        ChannelState::Outstanding { drops: 10 }
    );

    let eleventh = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.read_int(RequestOptions::at("%MB0").with_id(7)).await }
    });
    wait_for_calls(&loopback, 2).await;
    assert_eq!(
        client.channel_state(7),
        ChannelState::Outstanding { drops: 0 }
    );

    loopback.release(2);
    assert!(matches!(first.await.unwrap(), Ok(Completion::Read(_))));
    assert!(matches!(eleventh.await.unwrap(), Ok(Completion::Read(_))));
    assert_eq!(client.channel_state(7), ChannelState::Idle);
    assert_eq!(loopback.calls(), 2);
}

#[tokio::test]
async fn test_other_channels_are_not_blocked() {
    let loopback = LoopbackTransport::gated();
    let client = Arc::new(Client::new(config(), loopback.clone()).unwrap());

    let busy = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.read_int(RequestOptions::at("%MB0").with_id(1)).await }
    });
    wait_for_calls(&loopback, 1).await;

    let other = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.read_int(RequestOptions::at("%MB0").with_id(2)).await }
    });
    let untagged = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.read_int(RequestOptions::at("%MB0")).await }
    });
    wait_for_calls(&loopback, 3).await;

    loopback.release(3);
    for handle in [busy, other, untagged] {
        assert!(!handle.await.unwrap().unwrap().is_dropped());
    }
}

#[tokio::test]
async fn test_cancelled_request_releases_channel() {
    let loopback = LoopbackTransport::gated();
    let client = Client::new(config(), loopback.clone()).unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        client.read_int(RequestOptions::at("%MB0").with_id(7)),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(loopback.calls(), 1);
    assert_eq!(client.channel_state(7), ChannelState::Idle);

    loopback.release(10);
    for _ in 0..10 {
        let completion = client
            .read_int(RequestOptions::at("%MB0").with_id(7))
            .await
            .unwrap();
        assert!(matches!(completion, Completion::Read(_)));
    }
    assert_eq!(loopback.calls(), 11);
    assert_eq!(client.channel_state(7), ChannelState::Idle);
}

#[tokio::test]
async fn test_item_selection_targets_single_element() {
    let (client, loopback) = loopback_client();
    let values = Arc::new(Slot::new(vec![10, 20, 30, 40, 50]));

    client
        .write_array_of_int(
            RequestOptions::at("%MB100")
                .with_target(values.clone())
                .with_item(2),
        )
        .await
        .unwrap();

    let request = loopback.requests().pop().unwrap();
    assert_eq!(request.index_group, Field::M.index_group());
    assert_eq!(request.index_offset, 104);
    assert_eq!(request.payload, vec![30, 0]);

    loopback.poke(Field::M, 104, &[0x63, 0x00]);
    client
        .read_array_of_int(
            RequestOptions::at("%MB100")
                .with_target(values.clone())
                .with_item(2),
        )
        .await
        .unwrap();
    assert_eq!(values.get(), Value::from(vec![10, 20, 99, 40, 50]));
}

#[tokio::test]
async fn test_bit_field_addressing() {
    let (client, loopback) = loopback_client();
    client
        .write_bool(RequestOptions::field(Field::MX, 3.5).with_value(true))
        .await
        .unwrap();
    assert_eq!(loopback.requests()[0].index_offset, 29);
    assert_eq!(loopback.peek(Field::M, 3, 1), vec![0b0010_0000]);

    client
        .write_bool(RequestOptions::field(Field::MX, 0.0).with_value(true))
        .await
        .unwrap();
    assert_eq!(loopback.requests()[1].index_offset, 0);

    let bits = client
        .read_array_of_bool(RequestOptions::at("%MX3.4").with_arr_len(3))
        .await
        .unwrap()
        .into_value();
    assert_eq!(bits, Some(Value::from(vec![false, true, false])));
}

#[tokio::test]
async fn test_aligned_struct_array_roundtrip() {
    let loopback = LoopbackTransport::new();
    let client = Client::new(config().with_data_align4(true), loopback.clone()).unwrap();
    let def = StructDefinition::parse([
        ("id", "BYTE"),
        ("count", "DINT"),
        ("label", "STRING.5"),
        ("temps", "ARRAY.2.INT1DP"),
    ])
    .unwrap();

    let store = HostStore::new();
    let rows = Arc::new(store.bind("plant.rows").unwrap());
    let row = |id: i64, count: i64, label: &str, t: [f64; 2]| -> Value {
        [
            ("id", Value::Int(id)),
            ("count", Value::Int(count)),
            ("label", Value::from(label)),
            ("temps", Value::from(t.to_vec())),
        ]
        .into_iter()
        .collect()
    };
    rows.set(Value::Array(vec![
        row(1, 100, "alpha", [21.5, -3.2]),
        row(2, -7, "b", [0.0, 99.9]),
    ]));

    client
        .write_array_of_struct(
            RequestOptions::at("%MB200")
                .with_definition(def.clone())
                .with_target(rows.clone()),
        )
        .await
        .unwrap();

    // id@0, pad 3, count@4, label@8 (6 bytes), temps@14, 16, end padding to 20
    let request = loopback.requests().pop().unwrap();
    assert_eq!(request.payload.len(), 40);
    assert_eq!(&request.payload[0..8], &[1, 0, 0, 0, 100, 0, 0, 0]);
    assert_eq!(&request.payload[8..14], b"alpha\0");
    assert_eq!(&request.payload[14..18], &[0xD7, 0x00, 0xE0, 0xFF]);

    let fresh = Arc::new(Slot::empty());
    let value = client
        .read_array_of_struct(
            RequestOptions::at("%MB200")
                .with_definition(def)
                .with_arr_len(2)
                .with_target(fresh.clone()),
        )
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(value, rows.get());
    assert_eq!(fresh.get(), value);
}

#[tokio::test]
async fn test_bounds_are_reported_not_fatal() {
    let (client, loopback) = loopback_client();
    let descriptor = client
        .prepare(
            Method::Write,
            tame_ads::RequestKind::Scalar(tame_ads::TypeTag::Int),
            RequestOptions::at("%MB0").with_value(40000),
        )
        .unwrap();
    assert_eq!(descriptor.warnings.len(), 1);
    assert_eq!(descriptor.payload, vec![0xFF, 0x7F]);
    client.execute(descriptor).await.unwrap();
    assert_eq!(loopback.peek(Field::M, 0, 2), vec![0xFF, 0x7F]);

    client
        .write_real(RequestOptions::at("%MB4").with_value(1e-40))
        .await
        .unwrap();
    let value = client
        .read_real(RequestOptions::at("%MB4"))
        .await
        .unwrap()
        .into_value();
    match value {
        Some(Value::Real(v)) => assert!((v - 1.175495e-38).abs() < 1e-44, "{v}"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_unchecked_bounds_wrap() {
    let loopback = LoopbackTransport::new();
    let client = Client::new(config().with_check_bounds(false), loopback.clone()).unwrap();
    client
        .write_sint(RequestOptions::at("%MB0").with_value(-1))
        .await
        .unwrap();
    client
        .write_byte(RequestOptions::at("%MB1").with_value(255))
        .await
        .unwrap();
    assert_eq!(loopback.peek(Field::M, 0, 2), vec![0xFF, 0xFF]);

    let sint = client.read_sint(RequestOptions::at("%MB1")).await.unwrap();
    let byte = client.read_byte(RequestOptions::at("%MB0")).await.unwrap();
    assert_eq!(sint.into_value(), Some(Value::Int(-1)));
    assert_eq!(byte.into_value(), Some(Value::Int(255)));
}

#[tokio::test]
async fn test_temporal_and_string_values() {
    let loopback = LoopbackTransport::new();
    let client = Client::new(config().with_language(Language::English), loopback).unwrap();
    let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(13, 45, 10)
        .unwrap();

    client
        .write_dt(RequestOptions::at("%MB0").with_value(dt))
        .await
        .unwrap();
    let read = client.read_dt(RequestOptions::at("%MB0")).await.unwrap();
    assert_eq!(read.into_value(), Some(Value::DateTime(dt)));

    let text = client
        .read_dt(RequestOptions::at("%MB0").with_format("#WKD#, #DD#.#MM#.#YYYY# #hh#:#mm"))
        .await
        .unwrap();
    assert_eq!(
        text.into_value(),
        Some(Value::Text("Thu, 29.02.2024 13:45".into()))
    );

    client
        .write_time(RequestOptions::at("%MB8").with_value(1.5).with_format("#s"))
        .await
        .unwrap();
    let ms = client.read_time(RequestOptions::at("%MB8")).await.unwrap();
    assert_eq!(ms.into_value(), Some(Value::Int(1500)));

    client
        .write_string(
            RequestOptions::at("%MB20")
                .with_value("conveyor belt")
                .with_str_len(8),
        )
        .await
        .unwrap();
    let s = client
        .read_string(RequestOptions::at("%MB20").with_str_len(8))
        .await
        .unwrap();
    assert_eq!(s.into_value(), Some(Value::Text("conveyor".into())));
}

#[tokio::test]
async fn test_decimals_prefix_and_suffix() {
    let (client, _) = loopback_client();
    client
        .write_lreal(RequestOptions::at("%MB0").with_value(3.14159))
        .await
        .unwrap();
    let value = client
        .read_lreal(
            RequestOptions::at("%MB0")
                .with_dec_places(2)
                .with_prefix("pi ~ ")
                .with_suffix("!"),
        )
        .await
        .unwrap();
    assert_eq!(value.into_value(), Some(Value::Text("pi ~ 3.14!".into())));
}

#[tokio::test]
async fn test_delayed_callback() {
    let (client, _) = loopback_client();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    client
        .write_word(
            RequestOptions::at("%MB0")
                .with_value(1)
                .with_on_complete(move || flag.store(true, Ordering::SeqCst))
                .with_on_complete_delay(Duration::from_millis(30)),
        )
        .await
        .unwrap();
    assert!(!fired.load(Ordering::SeqCst));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_address_error_sends_nothing() {
    let (client, loopback) = loopback_client();
    let err = client
        .read_int(RequestOptions::parts("MX", "1.9"))
        .await
        .unwrap_err();
    assert!(matches!(err, TameError::AddressResolution { .. }));
    assert_eq!(loopback.calls(), 0);
}

struct ScriptedTransport {
    reply: fn(&TransportRequest) -> TransportReply,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: TransportRequest) -> Result<TransportReply> {
        Ok((self.reply)(&request))
    }
}

#[tokio::test]
async fn test_correlation_mismatch() {
    let transport = ScriptedTransport {
        reply: |req| TransportReply::Ack {
            token: req.token + 100,
        },
    };
    let client = Client::new(config(), transport).unwrap();
    let err = client
        .write_int(RequestOptions::at("%MB0").with_value(1).with_id(4))
        .await
        .unwrap_err();
    assert!(matches!(err, TameError::CorrelationMismatch { .. }));
    assert_eq!(client.channel_state(4), ChannelState::Idle);
}

#[tokio::test]
async fn test_short_reply_is_decode_error() {
    let transport = ScriptedTransport {
        reply: |req| TransportReply::Data {
            token: req.token,
            payload: vec![0; 3],
        },
    };
    let client = Client::new(config(), transport).unwrap();
    let sink = Arc::new(Slot::new(7));
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let err = client
        .read_array_of_int(
            RequestOptions::at("%MB0")
                .with_arr_len(2)
                .with_target(sink.clone())
                .with_on_complete(move || flag.store(true, Ordering::SeqCst)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TameError::Decode { .. }));
    assert_eq!(sink.get(), Value::Int(7));
    assert!(!fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_base64_reply_from_service() {
    let transport = ScriptedTransport {
        reply: |req| TransportReply::data_from_base64(req.token, "AQIDBA==").unwrap(),
    };
    let client = Client::new(config(), transport).unwrap();
    let value = client
        .read_udint(RequestOptions::at("%MB0"))
        .await
        .unwrap()
        .into_value();
    assert_eq!(value, Some(Value::Int(0x0403_0201)));
}

#[tokio::test]
async fn test_read_items_explicit_addresses() {
    let (client, loopback) = loopback_client();
    loopback.poke(Field::M, 50, &[0x10, 0x00]);
    loopback.poke(Field::M, 60, &[0x00, 0x00, 0x48, 0x41]);

    let target = Arc::new(Slot::empty());
    client
        .read_items(
            RequestOptions::at("%MB50")
                .with_entry("count", PlcType::Uint, 50)
                .with_entry("sensor.value", PlcType::Real { decimals: None }, 60)
                .with_target(target.clone()),
        )
        .await
        .unwrap();

    let request = loopback.requests().pop().unwrap();
    assert_eq!(request.read_len, 14);
    assert_eq!(
        target.get().get_path(&"sensor.value".parse().unwrap()),
        Some(&Value::Real(12.5))
    );
    assert_eq!(
        target.get().get_path(&"count".parse().unwrap()),
        Some(&Value::Int(16))
    );
}
