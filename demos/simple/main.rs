use fluxgate::EvaluationRequest;

pub fn main() -> fluxgate::Result<()> {
    // Configure env_logger to see FluxGate client logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("fluxgate")).init();

    let base_url = std::env::var("FLUXGATE_BASE_URL")
        .unwrap_or_else(|_| fluxgate::ClientConfig::DEFAULT_BASE_URL.to_owned());
    let mut config = fluxgate::ClientConfig::from_base_url(base_url);
    if let (Ok(id), Ok(secret)) = (
        std::env::var("FLUXGATE_CLIENT_ID"),
        std::env::var("FLUXGATE_CLIENT_SECRET"),
    ) {
        config = config.credentials(id, secret);
    }

    // Returns None if the client is disabled in configuration.
    let Some(client) = config.to_client_if_enabled()? else {
        println!("feature flag client is disabled");
        return Ok(());
    };

    // Start a poller thread to watch the edge server health (None if health checks are off).
    let poller = client.start_health_poller()?;
    if let Some(poller) = &poller {
        let health = poller.wait_for_first_check();
        println!(
            "{}",
            serde_json::to_string_pretty(&health).unwrap_or_default()
        );
    }

    let request = EvaluationRequest::with_context("new-checkout", "prod", [("userId", "123")]);

    // Falls back to `false` if the edge server cannot answer.
    let enabled = client.evaluate_or(&request, false)?;
    println!("{request}: enabled={enabled}");

    client.execute(&request, || println!("running the new checkout flow"))?;

    let pending = client.is_enabled_async("beta-banner", "prod")?;
    match pending.wait() {
        Ok(enabled) => println!("beta-banner: enabled={enabled}"),
        Err(err) => println!("error evaluating beta-banner: {err}"),
    }

    match poller {
        Some(poller) => poller.shutdown(),
        None => Ok(()),
    }
}
