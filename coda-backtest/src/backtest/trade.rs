//! Trade lifecycle for backtesting.
//!
//! The lifecycle is split across two types so the open/closed invariant
//! is type-level:
//! - [`OpenPosition`]: the single in-flight position, mutated only for
//!   excursion tracking while open
//! - [`Trade`]: the immutable, fully-populated record produced when the
//!   position closes

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Bar;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => -Decimal::ONE,
        }
    }

    /// Entry fill at the bar close, adjusted against the trader:
    /// a buyer pays up, a seller receives less.
    pub fn entry_fill(&self, close: Decimal, slippage_rate: f64) -> Decimal {
        let slip = Decimal::from_f64(slippage_rate).unwrap_or_default();
        match self {
            Self::Long => close * (Decimal::ONE + slip),
            Self::Short => close * (Decimal::ONE - slip),
        }
    }

    /// Exit fill at the bar close, adjusted against the trader in the
    /// closing direction.
    pub fn exit_fill(&self, close: Decimal, slippage_rate: f64) -> Decimal {
        let slip = Decimal::from_f64(slippage_rate).unwrap_or_default();
        match self {
            Self::Long => close * (Decimal::ONE - slip),
            Self::Short => close * (Decimal::ONE + slip),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The signal flipped against the open direction.
    Signal,
    /// Forced close at the final bar of the dataset.
    EndOfData,
}

/// The single in-flight position of a run.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub trade_id: u64,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_time: DateTime<Utc>,
    /// Unadjusted close at entry; gross P&L is measured close-to-close.
    pub entry_close: Decimal,
    /// Slippage-adjusted fill price.
    pub entry_price: Decimal,
    pub position_size: Decimal,
    /// Cash at entry, before entry costs.
    pub entry_capital: Decimal,
    pub entry_commission: Decimal,
    pub entry_slippage: Decimal,
    max_favorable_excursion: f64,
    max_adverse_excursion: f64,
}

impl OpenPosition {
    /// Open a position at the bar close.
    ///
    /// `entry_price` is the already slippage-adjusted fill; the caller
    /// sizes the position against it.
    pub fn open(
        trade_id: u64,
        symbol: &str,
        bar: &Bar,
        direction: TradeDirection,
        entry_price: Decimal,
        position_size: Decimal,
        entry_capital: Decimal,
        commission_rate: f64,
    ) -> Self {
        let commission_rate = Decimal::from_f64(commission_rate).unwrap_or_default();
        Self {
            trade_id,
            symbol: symbol.to_string(),
            direction,
            entry_time: bar.timestamp,
            entry_close: bar.close,
            entry_price,
            position_size,
            entry_capital,
            entry_commission: entry_price * position_size * commission_rate,
            entry_slippage: (entry_price - bar.close).abs() * position_size,
            max_favorable_excursion: 0.0,
            max_adverse_excursion: 0.0,
        }
    }

    /// Cash to deduct when the position is opened.
    pub fn entry_cost(&self) -> Decimal {
        self.entry_commission + self.entry_slippage
    }

    /// Mark-to-market P&L against the unadjusted entry close.
    pub fn unrealized_pnl(&self, close: Decimal) -> Decimal {
        self.direction.sign() * (close - self.entry_close) * self.position_size
    }

    /// Update excursion extremes with a bar close. Both excursions are
    /// expressed as a percentage of the entry price and never decrease.
    pub fn update_excursions(&mut self, close: Decimal) {
        if self.entry_price.is_zero() {
            return;
        }
        let move_pct: f64 = (self.direction.sign() * (close - self.entry_price)
            / self.entry_price
            * Decimal::from(100))
        .try_into()
        .unwrap_or(0.0);

        self.max_favorable_excursion = self.max_favorable_excursion.max(move_pct.max(0.0));
        self.max_adverse_excursion = self.max_adverse_excursion.max((-move_pct).max(0.0));
    }

    /// Close at the bar close and produce the final trade record.
    ///
    /// Returns the trade and the cash delta to apply: gross P&L minus
    /// the exit-side costs (entry costs were charged when the position
    /// was opened).
    pub fn close(
        self,
        bar: &Bar,
        reason: ExitReason,
        commission_rate: f64,
        slippage_rate: f64,
    ) -> (Trade, Decimal) {
        let exit_price = self.direction.exit_fill(bar.close, slippage_rate);
        let exit_slippage = (bar.close - exit_price).abs() * self.position_size;
        let exit_commission = exit_price
            * self.position_size
            * Decimal::from_f64(commission_rate).unwrap_or_default();

        let pnl = self.direction.sign() * (bar.close - self.entry_close) * self.position_size;
        let commission = self.entry_commission + exit_commission;
        let slippage = self.entry_slippage + exit_slippage;
        let net_pnl = pnl - commission - slippage;

        let entry_notional = self.entry_price * self.position_size;
        let pnl_pct = if entry_notional.is_zero() {
            0.0
        } else {
            (pnl / entry_notional * Decimal::from(100))
                .try_into()
                .unwrap_or(0.0)
        };

        let cash_delta = pnl - exit_commission - exit_slippage;
        let trade = Trade {
            trade_id: self.trade_id,
            symbol: self.symbol,
            direction: self.direction,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            position_size: self.position_size,
            entry_capital: self.entry_capital,
            exit_time: bar.timestamp,
            exit_price,
            exit_reason: reason,
            pnl,
            pnl_pct,
            commission,
            slippage,
            net_pnl,
            max_favorable_excursion: self.max_favorable_excursion,
            max_adverse_excursion: self.max_adverse_excursion,
        };
        (trade, cash_delta)
    }
}

/// One completed position lifecycle. Immutable after close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique within a run.
    pub trade_id: u64,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_time: DateTime<Utc>,
    /// Slippage-adjusted entry fill.
    pub entry_price: Decimal,
    /// Position magnitude in units; direction carries the sign.
    pub position_size: Decimal,
    /// Cash at entry.
    pub entry_capital: Decimal,
    pub exit_time: DateTime<Utc>,
    /// Slippage-adjusted exit fill.
    pub exit_price: Decimal,
    pub exit_reason: ExitReason,
    /// Gross P&L, measured close-to-close before costs.
    pub pnl: Decimal,
    /// Gross P&L as a percentage of entry notional.
    pub pnl_pct: f64,
    /// Entry plus exit commission.
    pub commission: Decimal,
    /// Entry plus exit slippage cost.
    pub slippage: Decimal,
    /// `pnl - commission - slippage`.
    pub net_pnl: Decimal,
    /// Best close relative to entry while open, percent of entry price.
    pub max_favorable_excursion: f64,
    /// Worst close relative to entry while open, percent of entry price.
    pub max_adverse_excursion: f64,
}

impl Trade {
    /// Time spent in the position.
    pub fn duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    /// Whether the trade was profitable net of costs.
    pub fn is_winner(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(secs: i64, close: Decimal) -> Bar {
        Bar::from_close(DateTime::from_timestamp(secs, 0).unwrap(), close, 1.0)
    }

    #[test]
    fn test_entry_fill_against_trader() {
        assert_eq!(
            TradeDirection::Long.entry_fill(dec!(100), 0.01),
            dec!(101.00)
        );
        assert_eq!(
            TradeDirection::Short.entry_fill(dec!(100), 0.01),
            dec!(99.00)
        );
        assert_eq!(TradeDirection::Long.exit_fill(dec!(100), 0.01), dec!(99.00));
        assert_eq!(
            TradeDirection::Short.exit_fill(dec!(100), 0.01),
            dec!(101.00)
        );
    }

    #[test]
    fn test_excursions_are_monotone() {
        let mut position = OpenPosition::open(
            1,
            "BTCUSDT",
            &bar(0, dec!(100)),
            TradeDirection::Long,
            dec!(100),
            dec!(1),
            dec!(10000),
            0.0,
        );

        position.update_excursions(dec!(110));
        assert_eq!(position.max_favorable_excursion, 10.0);
        assert_eq!(position.max_adverse_excursion, 0.0);

        position.update_excursions(dec!(95));
        assert_eq!(position.max_favorable_excursion, 10.0);
        assert_eq!(position.max_adverse_excursion, 5.0);

        // A retrace never lowers either extreme.
        position.update_excursions(dec!(100));
        assert_eq!(position.max_favorable_excursion, 10.0);
        assert_eq!(position.max_adverse_excursion, 5.0);
    }

    #[test]
    fn test_close_long_no_costs() {
        let position = OpenPosition::open(
            1,
            "BTCUSDT",
            &bar(0, dec!(100)),
            TradeDirection::Long,
            dec!(100),
            dec!(100),
            dec!(10000),
            0.0,
        );
        let (trade, cash_delta) = position.close(&bar(60, dec!(110)), ExitReason::Signal, 0.0, 0.0);

        assert_eq!(trade.pnl, dec!(1000));
        assert_eq!(trade.net_pnl, dec!(1000));
        assert_eq!(trade.commission, dec!(0));
        assert_eq!(trade.slippage, dec!(0));
        assert_eq!(cash_delta, dec!(1000));
        assert_eq!(trade.pnl_pct, 10.0);
        assert_eq!(trade.duration(), Duration::seconds(60));
        assert!(trade.is_winner());
    }

    #[test]
    fn test_close_short_profits_from_decline() {
        let position = OpenPosition::open(
            2,
            "ETHUSDT",
            &bar(0, dec!(100)),
            TradeDirection::Short,
            dec!(100),
            dec!(10),
            dec!(1000),
            0.0,
        );
        let (trade, _) = position.close(&bar(60, dec!(90)), ExitReason::Signal, 0.0, 0.0);
        assert_eq!(trade.pnl, dec!(100));
        assert!(trade.is_winner());
    }

    #[test]
    fn test_costs_reduce_net_pnl() {
        let entry_bar = bar(0, dec!(100));
        let direction = TradeDirection::Long;
        let entry_price = direction.entry_fill(entry_bar.close, 0.001);
        let position = OpenPosition::open(
            3,
            "BTCUSDT",
            &entry_bar,
            direction,
            entry_price,
            dec!(10),
            dec!(10000),
            0.001,
        );
        let entry_cost = position.entry_cost();
        let (trade, cash_delta) =
            position.close(&bar(60, dec!(110)), ExitReason::Signal, 0.001, 0.001);

        assert_eq!(trade.pnl, dec!(100));
        assert!(trade.net_pnl < trade.pnl);
        assert_eq!(trade.net_pnl, trade.pnl - trade.commission - trade.slippage);
        // Cash deltas across the lifecycle sum to net P&L.
        assert_eq!(cash_delta - entry_cost, trade.net_pnl);
    }
}
