pub mod fast_logger;
pub mod format_registry;
pub mod loggable;
pub mod ring_buffer;
pub mod thread_queue;

pub use fast_logger::{Error, LogLevel, Logger, LoggerBuilder, MessageSlot, PAYLOAD_CAPACITY};
pub use format_registry::Formatter;
pub use loggable::{LogArguments, Loggable};
pub use ring_buffer::{RingBuffer, QUEUE_CAPACITY};
pub use thread_queue::{QueueRegistry, ThreadQueue};
