use crate::api::{BinanceClient, GatewayError, TickerStats};

const QUOTE_SUFFIX: &str = "USDT";

// Leveraged-token suffixes that must never be traded
const EXCLUDED_MARKERS: &[&str] = &["UP", "DOWN", "BEAR", "BULL"];

/// Scans the 24h ticker set for the fastest-rising quote-currency pairs.
pub struct MarketScanner {
    top_gainers: Vec<TickerStats>,
}

impl MarketScanner {
    pub fn new() -> Self {
        Self {
            top_gainers: Vec::new(),
        }
    }

    /// Scan and return the top gainer symbols, best first.
    pub async fn scan_top_gainers(
        &mut self,
        client: &BinanceClient,
        count: usize,
    ) -> Result<Vec<String>, GatewayError> {
        let tickers = client.get_24h_tickers().await?;
        self.top_gainers = rank_gainers(tickers, count);

        let symbols: Vec<String> = self.top_gainers.iter().map(|t| t.symbol.clone()).collect();
        tracing::debug!("Scanned {} top gainers", symbols.len());
        Ok(symbols)
    }

    /// Ticker details from the last scan, if the symbol was in it
    pub fn gainer_info(&self, symbol: &str) -> Option<&TickerStats> {
        self.top_gainers.iter().find(|t| t.symbol == symbol)
    }

    pub fn last_scan(&self) -> &[TickerStats] {
        &self.top_gainers
    }
}

impl Default for MarketScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn rank_gainers(tickers: Vec<TickerStats>, count: usize) -> Vec<TickerStats> {
    let mut usdt_pairs: Vec<TickerStats> = tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with(QUOTE_SUFFIX))
        .filter(|t| {
            let base = &t.symbol[..t.symbol.len() - QUOTE_SUFFIX.len()];
            !EXCLUDED_MARKERS.iter().any(|m| base.ends_with(m))
        })
        .collect();

    usdt_pairs.sort_by(|a, b| {
        b.price_change_percent
            .partial_cmp(&a.price_change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    usdt_pairs.truncate(count);
    usdt_pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, change: f64) -> TickerStats {
        TickerStats {
            symbol: symbol.to_string(),
            last_price: 1.0,
            price_change_percent: change,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_ranks_by_price_change_descending() {
        let ranked = rank_gainers(
            vec![
                ticker("AAAUSDT", 5.0),
                ticker("BBBUSDT", 15.0),
                ticker("CCCUSDT", 10.0),
            ],
            3,
        );

        let symbols: Vec<&str> = ranked.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BBBUSDT", "CCCUSDT", "AAAUSDT"]);
    }

    #[test]
    fn test_filters_non_usdt_pairs() {
        let ranked = rank_gainers(vec![ticker("AAABTC", 50.0), ticker("BBBUSDT", 1.0)], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "BBBUSDT");
    }

    #[test]
    fn test_filters_leveraged_tokens() {
        let ranked = rank_gainers(
            vec![
                ticker("BTCUPUSDT", 90.0),
                ticker("ETHDOWNUSDT", 80.0),
                ticker("XXXBULLUSDT", 70.0),
                ticker("YYYBEARUSDT", 60.0),
                ticker("SOLUSDT", 5.0),
            ],
            10,
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "SOLUSDT");
    }

    #[test]
    fn test_truncates_to_requested_count() {
        let tickers = (0..20)
            .map(|i| ticker(&format!("T{:02}USDT", i), i as f64))
            .collect();
        let ranked = rank_gainers(tickers, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].price_change_percent, 19.0);
    }

    #[tokio::test]
    async fn test_scan_top_gainers_against_mock() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    {"symbol": "AAAUSDT", "lastPrice": "1.0", "priceChangePercent": "4.0", "volume": "100"},
                    {"symbol": "BBBUSDT", "lastPrice": "2.0", "priceChangePercent": "9.0", "volume": "200"},
                    {"symbol": "CCCBTC", "lastPrice": "3.0", "priceChangePercent": "90.0", "volume": "300"}
                ]"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url(), "k", "s");
        let mut scanner = MarketScanner::new();

        let symbols = scanner.scan_top_gainers(&client, 10).await.unwrap();
        assert_eq!(symbols, vec!["BBBUSDT", "AAAUSDT"]);
        assert!(scanner.gainer_info("BBBUSDT").is_some());
        assert!(scanner.gainer_info("CCCBTC").is_none());
    }
}
