pub mod candle_buffer;
pub mod orderbook;

pub use candle_buffer::{CandleBuffer, CandleKey};
pub use orderbook::OrderBookManager;
