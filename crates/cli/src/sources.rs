use anyhow::Result;
use async_trait::async_trait;
use macro_trade_core::market::{MacroPoint, NewsSignalSummary};
use macro_trade_core::traits::{MacroSource, NewsSignalSource};

/// Macro source used when no fetcher is wired in. Every poll yields
/// "no data this cycle", so the regime engine stays in its defaults.
pub struct OfflineMacroSource;

#[async_trait]
impl MacroSource for OfflineMacroSource {
    async fn currency_index(&self) -> Result<Option<MacroPoint>> {
        Ok(None)
    }

    async fn market_dominance(&self) -> Result<Option<MacroPoint>> {
        Ok(None)
    }
}

/// News source that always reports an empty summary.
pub struct QuietNewsSource;

#[async_trait]
impl NewsSignalSource for QuietNewsSource {
    async fn latest_summary(&self) -> Result<NewsSignalSummary> {
        Ok(NewsSignalSummary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macro_trade_core::market::RiskSignal;

    #[tokio::test]
    async fn offline_source_yields_no_data() {
        let source = OfflineMacroSource;
        assert!(source.currency_index().await.unwrap().is_none());
        assert!(source.market_dominance().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quiet_news_is_neutral() {
        let summary = QuietNewsSource.latest_summary().await.unwrap();
        assert_eq!(summary.news_count, 0);
        assert_eq!(summary.risk_signal, RiskSignal::Neutral);
    }
}
