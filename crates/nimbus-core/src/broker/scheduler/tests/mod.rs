use super::*;
use crate::broker::config::SchedulerConfig;
use crate::notify::BrokerEvent;
use crate::queue::QueueKind;
use crate::retry::{FixedBackoff, RetryConfig, RetryStrategy};

mod common;
use common::*;

mod dlq;
