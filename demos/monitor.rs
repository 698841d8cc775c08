use std::env;
use std::time::Duration;

use infinitude::InfinitudeClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let url = args.get(1).expect("usage: monitor <infinitude-url>");

    let client = InfinitudeClient::builder(url.as_str()).build();

    loop {
        if let Some(status) = client.get_status().await {
            for zone in status.enabled_zones() {
                let temp = zone.temperature();
                println!(
                    "[{}] {} | rh: {}% | {:?} | activity: {:?}",
                    zone.name.as_deref().unwrap_or(&zone.id),
                    temp.map(|t| format!("{:.1}\u{00b0}C / {:.1}\u{00b0}F", t.celsius(), t.fahrenheit()))
                        .unwrap_or_else(|| "?".to_string()),
                    zone.humidity().unwrap_or(0.0),
                    zone.conditioning(),
                    zone.current_activity,
                );
            }
            if let Some(outdoor) = status.outdoor_temperature() {
                println!(
                    "Outdoor: {:.1}\u{00b0}C / {:.1}\u{00b0}F",
                    outdoor.celsius(),
                    outdoor.fahrenheit(),
                );
            }
        } else {
            eprintln!("status unavailable");
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
