pub mod clickhouse;
pub mod domain;
pub mod garde;
pub mod nats;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub use domain::MockBlobArchive;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRawEventProducer;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRowStore;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
