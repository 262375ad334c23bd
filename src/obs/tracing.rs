// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by the authentication flow.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("registry_auth.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs an eager refresh failure that was hidden behind a still-valid cached value.
pub fn record_swallowed_refresh(err: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error = %err, "eager refresh failed; serving cached value");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}

/// Logs a retry decision taken by the pipeline retry middleware.
pub fn record_retry(attempt: u32, delay: Duration, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, delay_ms = delay.whole_milliseconds() as u64, %reason, "retrying request");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay, reason);
	}
}
