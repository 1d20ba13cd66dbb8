//! Order book snapshot types and the imbalance computation.

/// One price level as returned by the data source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// A point-in-time view of the book: bids descending by price, asks
/// ascending. Lives for one evaluation cycle and is then discarded.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Normalized buy/sell pressure over the top `depth` levels per side:
/// `(bid_vol - ask_vol) / (bid_vol + ask_vol)`, in [-1, 1].
///
/// A shallow book contributes only the levels it has. An empty side counts
/// as zero volume, so a one-sided book yields +1 or -1. Both sides empty
/// (or all-zero sizes) yields exactly 0.0 rather than dividing by zero.
pub fn imbalance(book: &OrderBook, depth: usize) -> f64 {
    let bid_vol: f64 = book.bids.iter().take(depth).map(|l| l.size).sum();
    let ask_vol: f64 = book.asks.iter().take(depth).map(|l| l.size).sum();

    let denom = bid_vol + ask_vol;
    if denom == 0.0 {
        return 0.0;
    }
    (bid_vol - ask_vol) / denom
}
