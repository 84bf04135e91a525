//! Example: Reading and writing against an in-memory controller image
//!
//! Run with: cargo run --example loopback
//!
//! This example demonstrates:
//! - Writing scalars, arrays and structures
//! - Reading them back into a host value tree
//! - Formatted date/time reads and decimal places
//! - Channel deduplication and completion callbacks

use std::sync::Arc;
use std::time::Duration;

use tame_ads::{
    Binding, Client, ClientConfig, HostStore, Language, LoopbackTransport, RequestOptions,
    StructDefinition, Value,
};

#[tokio::main]
async fn main() -> tame_ads::Result<()> {
    // =========================================================================
    // Set up the client
    // =========================================================================

    let config = ClientConfig::new(
        "http://192.168.1.10/TcAdsWebService/TcAdsWebService.dll",
        "192.168.1.10.1.1",
    )
    .with_data_align4(true)
    .with_language(Language::English);
    let client = Client::new(config, LoopbackTransport::new())?;
    let store = HostStore::new();

    // =========================================================================
    // Scalars and arrays
    // =========================================================================

    println!("=== Scalars ===\n");

    client
        .write_int(RequestOptions::at("%MB0").with_value(-1234))
        .await?;
    client
        .write_real(RequestOptions::at("%MB4").with_value(21.25))
        .await?;
    client
        .write_array_of_word(RequestOptions::at("%MB8").with_value(vec![1u16, 2, 3, 4]))
        .await?;

    let level = Arc::new(store.bind("tank.level")?);
    client
        .read_int(RequestOptions::at("%MB0").with_target(level.clone()))
        .await?;
    println!("tank.level = {}", level.get());

    let temp = client
        .read_real(RequestOptions::at("%MB4").with_dec_places(1).with_suffix(" °C"))
        .await?;
    println!("temperature = {:?}", temp.into_value());

    // Only element 2 of the array
    let words = client
        .read_array_of_word(RequestOptions::at("%MB8").with_arr_len(4).with_item(2))
        .await?;
    println!("words[2] = {:?}", words.into_value());

    // =========================================================================
    // Structures
    // =========================================================================

    println!("\n=== Structures ===\n");

    let def = StructDefinition::parse([
        ("running", "BOOL"),
        ("speed", "DINT"),
        ("name", "STRING.10"),
        ("started", "DT.#YYYY#-#MM#-#DD# #hh#:#mm"),
    ])?;
    client.register_definition("motor", def);

    let motors = Arc::new(store.bind("line.motors")?);
    let now = chrono::Local::now().naive_local();
    motors.set(Value::Array(vec![
        [
            ("running", Value::Bool(true)),
            ("speed", Value::Int(1450)),
            ("name", Value::from("feeder")),
            ("started", Value::DateTime(now)),
        ]
        .into_iter()
        .collect(),
        [
            ("running", Value::Bool(false)),
            ("speed", Value::Int(0)),
            ("name", Value::from("press")),
            ("started", Value::DateTime(now)),
        ]
        .into_iter()
        .collect(),
    ]));

    client
        .write_array_of_struct(
            RequestOptions::at("%MB100")
                .with_definition_name("motor")
                .with_target(motors.clone()),
        )
        .await?;
    client
        .read_array_of_struct(
            RequestOptions::at("%MB100")
                .with_definition_name("motor")
                .with_target(motors.clone()),
        )
        .await?;
    println!("line.motors = {}", motors.get());

    // =========================================================================
    // Callbacks and channels
    // =========================================================================

    println!("\n=== Callbacks ===\n");

    client
        .write_bool(
            RequestOptions::at("%QX0.0")
                .with_id(1)
                .with_value(true)
                .with_on_complete(|| println!("output set"))
                .with_on_complete_delay(Duration::from_millis(20)),
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("channel 1: {:?}", client.channel_state(1));
    Ok(())
}
