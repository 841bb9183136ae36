//! Trade execution against a holdings snapshot.

use crate::domain::{Holdings, Trade};
use crate::error::TradeError;

/// Move `trade.share` of the portfolio from `trade.from` to `trade.to`.
///
/// The source must hold at least `share - accuracy`. When what would remain is
/// within `accuracy` of zero the whole source position is transferred and the
/// source is removed, so no dust is left behind.
pub fn apply_trade(holdings: &mut Holdings, trade: &Trade, accuracy: f64) -> Result<(), TradeError> {
    if !trade.share.is_finite() || trade.share < 0.0 {
        return Err(TradeError::InvalidShare { share: trade.share });
    }
    let available = holdings
        .get(&trade.from)
        .ok_or_else(|| TradeError::SourceNotHeld {
            asset: trade.from.clone(),
        })?;
    if available < trade.share - accuracy {
        return Err(TradeError::InsufficientShare {
            asset: trade.from.clone(),
            requested: trade.share,
            available,
        });
    }

    let transferred = if (trade.share - available).abs() < accuracy {
        holdings.remove(&trade.from);
        available
    } else {
        holdings.set(trade.from.clone(), available - trade.share);
        trade.share
    };
    holdings.credit(&trade.to, transferred);
    Ok(())
}

/// Apply a whole batch to a copy of `holdings`. Nothing is kept on failure.
pub fn apply_batch(holdings: &Holdings, trades: &[Trade], accuracy: f64) -> Result<Holdings, BatchFailure> {
    let mut working = holdings.clone();
    for (order, trade) in trades.iter().enumerate() {
        apply_trade(&mut working, trade, accuracy).map_err(|error| BatchFailure {
            order: Some(order),
            error,
        })?;
    }
    let sum = working.sum();
    if (sum - 1.0).abs() > 2.0 * accuracy {
        return Err(BatchFailure {
            order: None,
            error: TradeError::UnbalancedResult { sum },
        });
    }
    Ok(working)
}

/// Why a batch was discarded. `order` is the failing trade, `None` for the batch check.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub order: Option<usize>,
    pub error: TradeError,
}
