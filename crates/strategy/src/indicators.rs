use common::models::{Candle, Side};
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, Maximum, Minimum, RelativeStrengthIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

/// Fast/slow EMA stack on closes. Bullish needs fast above slow and the last
/// close above slow; bearish is the mirror.
pub fn trend(candles: &[Candle], fast: usize, slow: usize) -> Option<Trend> {
    let last = candles.last()?;
    let mut fast_ema = ExponentialMovingAverage::new(fast).ok()?;
    let mut slow_ema = ExponentialMovingAverage::new(slow).ok()?;

    let (mut fast_val, mut slow_val) = (last.close, last.close);
    for candle in candles {
        fast_val = fast_ema.next(candle.close);
        slow_val = slow_ema.next(candle.close);
    }

    let trend = if fast_val > slow_val && last.close > slow_val {
        Trend::Bullish
    } else if fast_val < slow_val && last.close < slow_val {
        Trend::Bearish
    } else {
        Trend::Neutral
    };
    Some(trend)
}

pub fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    let mut rsi = RelativeStrengthIndex::new(period).ok()?;
    candles.iter().map(|c| rsi.next(c.close)).last()
}

/// Last close beyond the extreme of the `lookback` bars before it.
pub fn breakout(candles: &[Candle], lookback: usize, side: Side) -> bool {
    if lookback == 0 || candles.len() <= lookback {
        return false;
    }
    let (prior, last) = candles.split_at(candles.len() - 1);
    let window = &prior[prior.len() - lookback..];
    let close = last[0].close;

    match side {
        Side::Long => {
            let Ok(mut max) = Maximum::new(lookback) else {
                return false;
            };
            let extreme = window.iter().map(|c| max.next(c.high)).last();
            extreme.is_some_and(|high| close > high)
        }
        Side::Short => {
            let Ok(mut min) = Minimum::new(lookback) else {
                return false;
            };
            let extreme = window.iter().map(|c| min.next(c.low)).last();
            extreme.is_some_and(|low| close < low)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Engulfing,
    PinBar,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engulfing => "engulfing",
            Self::PinBar => "pin_bar",
        }
    }
}

/// Entry pattern on the last bar(s) pointing in `side`'s direction.
pub fn entry_pattern(candles: &[Candle], side: Side) -> Option<Pattern> {
    let last = candles.last()?;

    if let [.., prev, _] = candles {
        let engulfing = match side {
            Side::Long => {
                prev.close < prev.open
                    && last.close > last.open
                    && last.open <= prev.close
                    && last.close >= prev.open
            }
            Side::Short => {
                prev.close > prev.open
                    && last.close < last.open
                    && last.open >= prev.close
                    && last.close <= prev.open
            }
        };
        if engulfing {
            return Some(Pattern::Engulfing);
        }
    }

    let range = last.high - last.low;
    if range <= 0.0 {
        return None;
    }
    let body = (last.close - last.open).abs();
    let lower_wick = last.open.min(last.close) - last.low;
    let upper_wick = last.high - last.open.max(last.close);

    let (rejection_wick, other_wick) = match side {
        Side::Long => (lower_wick, upper_wick),
        Side::Short => (upper_wick, lower_wick),
    };
    let pin_bar = rejection_wick >= 0.6 * range && rejection_wick >= 2.0 * body && other_wick <= body.max(0.1 * range);

    pin_bar.then_some(Pattern::PinBar)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pivots {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
}

/// Swing points: a bar whose high (low) is the extreme of the `strength` bars on each side.
pub fn pivots(candles: &[Candle], strength: usize) -> Pivots {
    let mut result = Pivots::default();
    if strength == 0 || candles.len() < 2 * strength + 1 {
        return result;
    }

    for i in strength..candles.len() - strength {
        let window = &candles[i - strength..=i + strength];
        let bar = &candles[i];
        if window.iter().all(|c| c.high <= bar.high) {
            result.highs.push(bar.high);
        }
        if window.iter().all(|c| c.low >= bar.low) {
            result.lows.push(bar.low);
        }
    }
    result
}

impl Pivots {
    /// Nearest pivot low strictly below `price`.
    pub fn support_below(&self, price: f64) -> Option<f64> {
        self.lows.iter().copied().filter(|l| *l < price).reduce(f64::max)
    }

    /// Nearest pivot high strictly above `price`.
    pub fn resistance_above(&self, price: f64) -> Option<f64> {
        self.highs.iter().copied().filter(|h| *h > price).reduce(f64::min)
    }
}
