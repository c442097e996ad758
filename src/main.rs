use std::sync::Arc;

use anyhow::Result;
use http_client_reqwest::HttpClientReqwest;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use usage_reporter::{
    CompletionEvent, HttpUsageSink, MeteringUsageReporter, ReporterConfig, UsageReporter,
    UsageSink,
};

struct UsageHookState {
    reporter: MeteringUsageReporter,
}

impl UsageHookState {
    fn new(config: ReporterConfig) -> Self {
        let http_client = Arc::new(HttpClientReqwest::default());
        Self::with_sink(config, Arc::new(HttpUsageSink::new(http_client)))
    }

    fn with_sink(config: ReporterConfig, sink: Arc<dyn UsageSink>) -> Self {
        Self {
            reporter: MeteringUsageReporter::new(config, sink),
        }
    }

    /// Reports one completion event. Malformed lines, including ones that
    /// are not UTF-8, are logged and skipped.
    fn process_line(&self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        match CompletionEvent::from_slice(line) {
            Ok(event) => self.reporter.report(
                &event.kwargs,
                &event.completion_response,
                event.start_time,
                event.end_time,
            ),
            Err(err) => err.log(),
        }
    }

    /// Feeds every line of `input` to the reporter until EOF. A read error
    /// ends the input early; it is logged, not returned.
    async fn consume<R>(&self, mut input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        loop {
            line.clear();
            match input.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => self.process_line(&line),
                Err(err) => {
                    log::error!("Failed to read completion events: {}", err);
                    break;
                }
            }
        }
    }

    async fn shutdown(self) {
        self.reporter.shutdown().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ReporterConfig::from_env();
    log::info!(
        "Starting {} {} (queue capacity {}, max in flight {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.queue_capacity,
        config.max_in_flight
    );

    let state = UsageHookState::new(config);

    state.consume(BufReader::new(io::stdin())).await;

    log::info!("Input closed, waiting for pending usage deliveries");
    state.shutdown().await;

    Ok(())
}
