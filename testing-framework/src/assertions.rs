//! Step-level assertions on named listeners.
//!
//! Static checks (kind, active flag, event name, block type, payload order)
//! are evaluated once. Call count checks go through the condition poller so
//! asynchronously delivered events have time to arrive.

use chainwatch_common::BlockType;

use crate::config::WaitPolicy;
use crate::context::TestContext;
use crate::error::HarnessError;
use crate::listeners::{ListenerKind, ListenerRecord};
use crate::waiters::{assert_eventually, Comparator};

impl TestContext {
    /// Wait until the call count of `listener` satisfies the comparison, using
    /// the configured wait policy
    pub async fn assert_call_count(
        &self,
        listener: &str,
        comparator: Comparator,
        expected: u64,
    ) -> Result<(), HarnessError> {
        self.assert_call_count_with(listener, comparator, expected, self.config().wait)
            .await
    }

    /// Same as [`assert_call_count`](Self::assert_call_count) with an explicit policy
    pub async fn assert_call_count_with(
        &self,
        listener: &str,
        comparator: Comparator,
        expected: u64,
        policy: WaitPolicy,
    ) -> Result<(), HarnessError> {
        // Unknown names fail right away rather than after a full timeout
        self.call_count(listener)?;

        let subject = format!("listener '{}' call count", listener);
        assert_eventually(
            self.clock(),
            &subject,
            || self.call_count(listener).unwrap_or(0) as u64,
            comparator,
            expected,
            policy.poll_interval,
            policy.timeout,
        )
        .await
    }

    /// Check the kind of `listener`
    pub fn assert_listener_kind(
        &self,
        listener: &str,
        expected: ListenerKind,
    ) -> Result<(), HarnessError> {
        let actual = self.listener(listener)?.kind();
        if actual != expected {
            return Err(HarnessError::KindMismatch {
                listener: format!("listener '{}'", listener),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check whether `listener` is still registered
    pub fn assert_listener_active(&self, listener: &str, expected: bool) -> Result<(), HarnessError> {
        let actual = self.listener(listener)?.is_active();
        if actual != expected {
            return Err(mismatch(listener, "active", expected, actual));
        }
        Ok(())
    }

    /// Check the event name an event listener filters on
    pub fn assert_listener_event(&self, listener: &str, event_name: &str) -> Result<(), HarnessError> {
        match self.listener(listener)? {
            ListenerRecord::Event(record) => {
                if record.event_name != event_name {
                    return Err(mismatch(listener, "event name", event_name, &record.event_name));
                }
                Ok(())
            }
            other => Err(HarnessError::KindMismatch {
                listener: format!("listener '{}'", listener),
                expected: ListenerKind::Event,
                actual: other.kind(),
            }),
        }
    }

    /// Check the block shape a block listener receives
    pub fn assert_block_type(&self, listener: &str, block_type: BlockType) -> Result<(), HarnessError> {
        match self.listener(listener)? {
            ListenerRecord::Block(record) => {
                if record.block_type != block_type {
                    return Err(mismatch(listener, "block type", block_type, record.block_type));
                }
                Ok(())
            }
            other => Err(HarnessError::KindMismatch {
                listener: format!("listener '{}'", listener),
                expected: ListenerKind::Block,
                actual: other.kind(),
            }),
        }
    }

    /// Check the recorded payload labels, in delivery order
    ///
    /// Labels are event names for event listeners, block numbers for block
    /// listeners and commit statuses for transaction listeners.
    pub fn assert_payloads<S: AsRef<str>>(
        &self,
        listener: &str,
        expected: &[S],
    ) -> Result<(), HarnessError> {
        let actual = self.listener(listener)?.payload_labels();
        let expected: Vec<&str> = expected.iter().map(|s| s.as_ref()).collect();

        if actual != expected {
            return Err(mismatch(
                listener,
                "payloads",
                format!("{:?}", expected),
                format!("{:?}", actual),
            ));
        }
        Ok(())
    }
}

fn mismatch(
    listener: &str,
    property: &'static str,
    expected: impl ToString,
    actual: impl ToString,
) -> HarnessError {
    HarnessError::PropertyMismatch {
        listener: format!("listener '{}'", listener),
        property,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
