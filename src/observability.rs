use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatpane.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatpane.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chatpane.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("chatpane.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatpane.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatpane.stream.bytes");

pub(crate) static SESSION_CHUNKS: Counter = Counter::new("chatpane.session.chunks");
pub(crate) static SESSION_COMMITS: Counter = Counter::new("chatpane.session.commits");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("chatpane.session.failures");
pub(crate) static SESSION_CANCELS: Counter = Counter::new("chatpane.session.cancels");
pub(crate) static SESSION_REJECTED: Counter = Counter::new("chatpane.session.rejected");
pub(crate) static SESSION_TTFB: Moments = Moments::new("chatpane.session.ttfb_seconds");
pub(crate) static SESSION_DURATION: Moments = Moments::new("chatpane.session.duration_seconds");
pub(crate) static SESSION_TURN_TOKENS: Moments = Moments::new("chatpane.session.turn_tokens");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SESSION_CHUNKS);
    collector.register_counter(&SESSION_COMMITS);
    collector.register_counter(&SESSION_FAILURES);
    collector.register_counter(&SESSION_CANCELS);
    collector.register_counter(&SESSION_REJECTED);
    collector.register_moments(&SESSION_TTFB);
    collector.register_moments(&SESSION_DURATION);
    collector.register_moments(&SESSION_TURN_TOKENS);
}
