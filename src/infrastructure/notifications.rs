//! Notification sinks

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::transactions::{Notification, NotificationSink};

/// Writes notifications to the log
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            "🔔 {}: {} ({})",
            notification.title, notification.message, notification.metadata.explorer_link
        );
    }
}

/// Forwards notifications to a channel consumer
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transactions::{TransactionMetadata, TransactionStatus, TransactionType};

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut receiver) = ChannelNotifier::channel();
        notifier.notify(Notification {
            id: "n1".to_string(),
            title: "Trade pending".to_string(),
            message: "1 WETH -> 2000 USDC".to_string(),
            metadata: TransactionMetadata {
                id: "0x1".to_string(),
                kind: TransactionType::Tx,
                status: TransactionStatus::Pending,
                is_success: false,
                explorer_link: "https://etherscan.io/tx/0x1".to_string(),
            },
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.title, "Trade pending");
    }
}
