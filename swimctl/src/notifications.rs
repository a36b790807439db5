//! Booking notification dispatcher.
//!
//! Successful bookings and reschedules render a one-line summary and push it
//! to a configured webhook as `{"message": "..."}`. Delivery is
//! fire-and-forget through a bounded channel: the admission path never waits
//! on the network and never fails because the webhook is down. Actors on the
//! excluded list (automation accounts) are filtered before anything is
//! queued.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NotificationsConfig;

/// The facts a booking summary is rendered from.
#[derive(Debug, Clone)]
pub struct BookingNotification {
    pub course_short_name: String,
    pub student_name: String,
    pub nickname: Option<String>,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub actor: String,
    pub rescheduled: bool,
}

impl BookingNotification {
    fn render(&self) -> String {
        let verb = if self.rescheduled { "rescheduled to" } else { "booked" };
        let who = match &self.nickname {
            Some(nickname) if !nickname.is_empty() => format!("{} ({})", nickname, self.student_name),
            _ => self.student_name.clone(),
        };
        format!(
            "[{}] {} {} {} {} (by {})",
            self.course_short_name,
            who,
            verb,
            self.class_date.format("%d/%m/%Y"),
            self.time_label,
            self.actor,
        )
    }
}

/// Cloneable handle the API layer queues notifications through.
#[derive(Clone)]
pub struct NotificationSender {
    tx: Option<mpsc::Sender<String>>,
    excluded_actors: Arc<HashSet<String>>,
}

impl NotificationSender {
    /// A sender that drops everything. Used when no webhook is configured
    /// and in tests that don't care about notifications.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            excluded_actors: Arc::new(HashSet::new()),
        }
    }

    /// Queue a booking summary. Never blocks, never fails the caller: a full
    /// queue or closed dispatcher is logged and the message dropped.
    pub fn send(&self, notification: BookingNotification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if self.excluded_actors.contains(&notification.actor) {
            tracing::debug!(actor = %notification.actor, "suppressing notification for excluded actor");
            return;
        }

        let message = notification.render();
        if let Err(err) = tx.try_send(message) {
            tracing::warn!(error = %err, "dropping booking notification");
        }
    }
}

/// Start the webhook dispatcher and hand back the sender half.
///
/// The task drains the channel until `shutdown` fires, then delivers what is
/// already queued and exits.
pub fn spawn_dispatcher(
    config: &NotificationsConfig,
    shutdown: CancellationToken,
) -> (NotificationSender, Option<tokio::task::JoinHandle<()>>) {
    let Some(webhook_url) = config.webhook_url.clone().filter(|_| config.enabled) else {
        tracing::info!("booking notifications disabled (no webhook configured)");
        return (NotificationSender::disabled(), None);
    };

    let (tx, mut rx) = mpsc::channel::<String>(config.channel_capacity);
    let sender = NotificationSender {
        tx: Some(tx),
        excluded_actors: Arc::new(config.excluded_actors.iter().cloned().collect()),
    };

    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .unwrap_or_default();

    let handle = tokio::spawn(async move {
        tracing::info!(url = %webhook_url, "booking notification dispatcher started");
        loop {
            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            deliver(&client, webhook_url.as_str(), &message).await;
        }

        // Drain whatever was queued before the shutdown signal
        while let Ok(message) = rx.try_recv() {
            deliver(&client, webhook_url.as_str(), &message).await;
        }
        tracing::info!("booking notification dispatcher stopped");
    });

    (sender, Some(handle))
}

async fn deliver(client: &reqwest::Client, url: &str, message: &str) {
    let result = client
        .post(url)
        .json(&serde_json::json!({ "message": message }))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!("delivered booking notification");
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), "notification webhook returned an error");
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to deliver booking notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification(actor: &str) -> BookingNotification {
        BookingNotification {
            course_short_name: "LTS".to_string(),
            student_name: "Mina Chai".to_string(),
            nickname: Some("Mimi".to_string()),
            class_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            time_label: "10:00".to_string(),
            actor: actor.to_string(),
            rescheduled: false,
        }
    }

    fn config(url: &str) -> NotificationsConfig {
        NotificationsConfig {
            webhook_url: Some(url.parse().unwrap()),
            excluded_actors: vec!["robot".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn render_includes_course_student_date_and_actor() {
        let message = notification("parent1").render();
        assert_eq!(message, "[LTS] Mimi (Mina Chai) booked 15/01/2024 10:00 (by parent1)");
    }

    #[tokio::test]
    async fn delivers_message_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "message": "[LTS] Mimi (Mina Chai) booked 15/01/2024 10:00 (by parent1)"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let shutdown = CancellationToken::new();
        let (sender, handle) = spawn_dispatcher(&config(&format!("{}/hook", server.uri())), shutdown.clone());

        sender.send(notification("parent1"));
        // Excluded actor never reaches the webhook
        sender.send(notification("robot"));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn webhook_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let shutdown = CancellationToken::new();
        let (sender, handle) = spawn_dispatcher(&config(&server.uri()), shutdown.clone());

        // Nothing panics or errors back to the caller
        sender.send(notification("parent1"));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.unwrap().await.unwrap();
    }
}
