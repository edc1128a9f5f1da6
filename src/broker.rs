use crate::error::TransportError;
use crate::models::{Bar, Order, OrderSide, Position};

/// Everything a broker session can report back. Events are delivered on a
/// single dispatch context in arrival order; per-symbol ordering is
/// preserved by the transport.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Positions(Vec<Position>),
    HistoryBars { symbol: String, bars: Vec<Bar> },
    HistoryFailed {
        symbol: String,
        error: TransportError,
    },
    OrderAccepted { symbol: String, side: OrderSide },
    OrderRejected {
        symbol: String,
        side: OrderSide,
        reason: String,
    },
    Filled { symbol: String, side: OrderSide },
    Disconnected,
}

/// Contract for a brokerage session. Requests are fire-and-forget; results
/// arrive as [`BrokerEvent`]s through [`recv_event`](Self::recv_event).
/// The wire-level mechanics behind these calls are not the engine's concern.
pub trait BrokerTransport {
    fn connect(&mut self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Asks for the current position snapshot; answered by
    /// [`BrokerEvent::Positions`].
    fn request_positions(&mut self);

    /// Asks for `lookback_days` of daily bars; answered by
    /// [`BrokerEvent::HistoryBars`] or [`BrokerEvent::HistoryFailed`].
    fn request_history(&mut self, symbol: &str, lookback_days: u32);

    /// Submits a market order; acknowledgment, rejection and fills arrive
    /// asynchronously. Orders are never cancelled by this engine.
    fn place_order(&mut self, order: &Order);

    /// Next event in arrival order, or None when the session is closed for
    /// good.
    fn recv_event(&mut self) -> impl std::future::Future<Output = Option<BrokerEvent>> + Send;
}
