use std::collections::{HashMap, VecDeque};

use crate::config::weights;
use crate::types::{Token, TxWindowMetrics, ViewMode};

const BUFFER_LEN: usize = crate::config::MOMENTUM_BUFFER_LEN;
const METRICS_FRESHNESS_MS: u64 = crate::config::METRICS_FRESHNESS_SECS * 1000;

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    t: u64,
    mc: f64,
    #[allow(dead_code)]
    vol: f64,
}

/// Rolling `(t, mc, vol)` history and blended-momentum score per token.
/// Owned by the orchestrator; a snapshot is recorded on every SSE frame and
/// every background REST refresh (§4.5).
#[derive(Default)]
pub struct MomentumScorer {
    buffers: HashMap<String, VecDeque<Snapshot>>,
    mvp_winner: Option<String>,
    mvp_since: Option<u64>,
}

/// The weighted score for one token under the current view mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Score {
    pub value: f64,
    pub has_data: bool,
}

impl MomentumScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&mut self, address: &str, t: u64, mc: f64, vol: f64) {
        let buf = self.buffers.entry(address.to_string()).or_default();
        buf.push_back(Snapshot { t, mc, vol });
        while buf.len() > BUFFER_LEN {
            buf.pop_front();
        }
    }

    pub fn drop_token(&mut self, address: &str) {
        self.buffers.remove(address);
    }

    /// Weighted average of slope over the last 2-6 samples, as a fraction
    /// of the earlier value. `has_data` requires at least 2 samples.
    fn sse_momentum(&self, address: &str) -> (f64, bool) {
        let buf = match self.buffers.get(address) {
            Some(b) if b.len() >= 2 => b,
            _ => return (0.0, false),
        };
        let window = buf.len().min(6).max(2);
        let slice: Vec<&Snapshot> = buf.iter().rev().take(window).collect();
        // slice[0] is newest; walk consecutive pairs oldest-to-newest within the window.
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for pair in slice.windows(2) {
            let newer = pair[0];
            let older = pair[1];
            if older.mc <= 0.0 {
                continue;
            }
            let slope = (newer.mc - older.mc) / older.mc;
            // uniform average across the window; every consecutive pair counts equally.
            let weight = 1.0;
            weighted_sum += slope * weight;
            weight_total += weight;
        }
        if weight_total <= 0.0 {
            (0.0, false)
        } else {
            (weighted_sum / weight_total, true)
        }
    }

    pub fn score(&self, token: &Token, view_mode: ViewMode, now_ms: u64) -> Score {
        let (sse_raw, sse_has_data) = self.sse_momentum(&token.contract_address);

        let metrics_fresh = token
            .last_metrics_update
            .map(|ts| now_ms.saturating_sub(ts) <= METRICS_FRESHNESS_MS)
            .unwrap_or(false);

        let m5 = token
            .tx_metrics
            .as_ref()
            .map(|m| m.m5)
            .unwrap_or_default();

        let (buy_pressure, net_buy_volume, txns_velocity, price_momentum) = if metrics_fresh {
            rest_components(&m5)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };
        let sse_component = sse_raw * 100.0;

        let w = weights_for(view_mode);
        let value = w.0 * buy_pressure
            + w.1 * net_buy_volume
            + w.2 * txns_velocity
            + w.3 * price_momentum
            + w.4 * sse_component;

        Score { value, has_data: metrics_fresh || sse_has_data }
    }

    /// Evaluate `score` for every candidate, select the max, tie-break on
    /// `current_mc / spotted_mc`, and track `mvp_since` across calls.
    pub fn select_mvp(
        &mut self,
        candidates: &[Token],
        view_mode: ViewMode,
        now_ms: u64,
    ) -> Option<(String, Score)> {
        let mut best: Option<(&Token, Score)> = None;
        for token in candidates {
            let s = self.score(token, view_mode, now_ms);
            best = match best {
                None => Some((token, s)),
                Some((bt, bs)) => {
                    if s.value > bs.value
                        || (s.value == bs.value && token.multiplier() > bt.multiplier())
                    {
                        Some((token, s))
                    } else {
                        Some((bt, bs))
                    }
                }
            };
        }

        let (winner, score) = best?;
        if self.mvp_winner.as_deref() != Some(winner.contract_address.as_str()) {
            self.mvp_winner = Some(winner.contract_address.clone());
            self.mvp_since = Some(now_ms);
        }
        Some((winner.contract_address.clone(), score))
    }

    pub fn mvp_since(&self) -> Option<u64> {
        self.mvp_since
    }
}

fn rest_components(m5: &TxWindowMetrics) -> (f64, f64, f64, f64) {
    let total = m5.buys + m5.sells;
    let buy_pressure = if total == 0 {
        0.5
    } else {
        m5.buys as f64 / total as f64
    };
    let buy_pressure_score = (buy_pressure - 0.5) * 20.0;

    let net = m5.buy_usd - m5.sell_usd;
    let net_buy_volume_score = if net == 0.0 {
        0.0
    } else {
        net.signum() * net.abs().max(1.0).log10() * 2.0
    };

    let txns_velocity_score = (total as f64 / 10.0).min(10.0);
    let price_momentum_score = m5.price_change_pct * 2.0;

    (buy_pressure_score, net_buy_volume_score, txns_velocity_score, price_momentum_score)
}

fn weights_for(view_mode: ViewMode) -> (f64, f64, f64, f64, f64) {
    match view_mode {
        ViewMode::FiveMin => weights::FIVE_MIN,
        ViewMode::ThirtyMin => weights::THIRTY_MIN,
        ViewMode::OneHour => weights::ONE_HOUR,
        ViewMode::FourHour => weights::FOUR_HOUR,
        ViewMode::AllTime => weights::ALL_TIME,
    }
}

/// Holder MVP: a separate algorithm over the holder list using holder-specific
/// baselines rather than the degen `spotted_mc`/`peak_mc` pair (§4.5).
pub fn holder_mvp(candidates: &[Token]) -> Option<(String, f64)> {
    candidates
        .iter()
        .map(|t| (t.contract_address.clone(), holder_score(t)))
        .fold(None, |best, (addr, score)| match best {
            None => Some((addr, score)),
            Some((_, bs)) if score > bs => Some((addr, score)),
            Some(b) => Some(b),
        })
}

fn holder_score(t: &Token) -> f64 {
    let mult = t.holder_multiplier();
    let mult_term = 0.40 * (mult / 10.0).min(1.0) * 100.0;

    let peak = t.holder_peak_mc.unwrap_or(t.current_mc);
    let ratio_term = if peak > 0.0 {
        0.30 * (t.current_mc / peak) * 100.0
    } else {
        0.0
    };

    let vol_term = 0.20 * (t.volume_24h / 100_000.0).min(1.0) * 100.0;

    let rank_term = t
        .holder_rank
        .map(|r| 0.10 * (110.0 - 10.0 * r as f64).max(0.0))
        .unwrap_or(0.0);

    mult_term + ratio_term + vol_term + rank_term
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    fn base_token(mc: f64, spotted_mc: f64) -> Token {
        let mut t = Token::new_degen(
            "addr".into(),
            "Foo".into(),
            "FOO".into(),
            "solana".into(),
            None,
            spotted_mc,
            1_000,
        );
        t.current_mc = mc;
        t
    }

    #[test]
    fn stale_metrics_zero_rest_components_but_sse_still_contributes() {
        let mut scorer = MomentumScorer::new();
        scorer.record_snapshot("addr", 1_000, 1000.0, 10.0);
        scorer.record_snapshot("addr", 2_000, 1100.0, 10.0);

        let mut t = base_token(1100.0, 1000.0);
        t.last_metrics_update = None; // never fetched -> stale
        let score = scorer.score(&t, ViewMode::OneHour, 3_000);
        assert!(score.has_data);
        assert!(score.value > 0.0);
    }

    #[test]
    fn no_data_when_metrics_stale_and_no_sse_samples() {
        let scorer = MomentumScorer::new();
        let t = base_token(1000.0, 1000.0);
        let score = scorer.score(&t, ViewMode::OneHour, 10_000);
        assert!(!score.has_data);
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn total_zero_tx_metrics_yields_neutral_buy_pressure() {
        let m5 = TxWindowMetrics::default();
        let (buy_pressure, net, _, _) = rest_components(&m5);
        assert_eq!(buy_pressure, 0.0); // (0.5 - 0.5) * 20
        assert_eq!(net, 0.0);
    }

    #[test]
    fn select_mvp_breaks_ties_on_multiplier() {
        let mut scorer = MomentumScorer::new();
        let mut a = base_token(2000.0, 1000.0); // multiplier 2.0
        a.contract_address = "a".into();
        a.id = "a".into();
        let mut b = base_token(3000.0, 1000.0); // multiplier 3.0
        b.contract_address = "b".into();
        b.id = "b".into();

        // Neither has tx_metrics or sse samples, so both score 0.0 -> tie.
        let (winner, _) = scorer.select_mvp(&[a, b], ViewMode::OneHour, 5_000).unwrap();
        assert_eq!(winner, "b");
    }

    #[test]
    fn mvp_since_resets_on_winner_change() {
        let mut scorer = MomentumScorer::new();
        let mut a = base_token(1000.0, 1000.0);
        a.contract_address = "a".into();
        let mut b = base_token(5000.0, 1000.0);
        b.contract_address = "b".into();

        scorer.select_mvp(&[a.clone()], ViewMode::OneHour, 1_000);
        assert_eq!(scorer.mvp_since(), Some(1_000));

        scorer.select_mvp(&[a.clone()], ViewMode::OneHour, 2_000);
        assert_eq!(scorer.mvp_since(), Some(1_000)); // unchanged winner

        scorer.select_mvp(&[b], ViewMode::OneHour, 3_000);
        assert_eq!(scorer.mvp_since(), Some(3_000)); // new winner resets
    }

    #[test]
    fn holder_mvp_prefers_higher_combined_score() {
        let mut low = base_token(100.0, 100.0);
        low.source = Source::Holder;
        low.holder_spotted_mc = Some(100.0);
        low.holder_peak_mc = Some(100.0);
        low.holder_rank = Some(50);

        let mut high = base_token(900.0, 100.0);
        high.contract_address = "high".into();
        high.source = Source::Holder;
        high.holder_spotted_mc = Some(100.0);
        high.holder_peak_mc = Some(1000.0);
        high.holder_rank = Some(1);

        let (winner, _) = holder_mvp(&[low, high]).unwrap();
        assert_eq!(winner, "high");
    }
}
