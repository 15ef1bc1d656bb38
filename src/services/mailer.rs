use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Settings;
use crate::error::DispatchError;
use crate::models::AlertCondition;
use crate::services::alert_engine::{NotificationDispatcher, PriceAlertEmail};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &Settings) -> Result<Self, String> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
            .map_err(|e| e.to_string())?
            .port(settings.smtp_port);

        if !settings.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.clone(),
            ));
        }

        let from = settings
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| format!("invalid SMTP_FROM address: {e}"))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn format_subject(alert: &PriceAlertEmail) -> String {
        match alert.condition {
            AlertCondition::Above => format!(
                "📈 {} reached your target of ${:.2}",
                alert.symbol, alert.target_price
            ),
            AlertCondition::Below => format!(
                "📉 {} dropped to your target of ${:.2}",
                alert.symbol, alert.target_price
            ),
        }
    }

    fn format_body(alert: &PriceAlertEmail) -> String {
        let direction = match alert.condition {
            AlertCondition::Above => "risen above",
            AlertCondition::Below => "fallen below",
        };

        format!(
            "Hi,\n\n\
            {company} ({symbol}) has {direction} your target price.\n\n\
            Target price: ${target:.2}\n\
            Current price: ${current:.2}\n\n\
            This alert is now off. Set a new one from your watchlist if you \
            want to keep following {symbol}.\n\n\
            {generated}\n",
            company = alert.company,
            symbol = alert.symbol,
            direction = direction,
            target = alert.target_price,
            current = alert.current_price,
            generated = alert.generated_at,
        )
    }
}

#[async_trait]
impl NotificationDispatcher for SmtpMailer {
    async fn send_price_alert(&self, alert: &PriceAlertEmail) -> Result<(), DispatchError> {
        let to = alert
            .email
            .parse::<Mailbox>()
            .map_err(|_| DispatchError::BadRecipient(alert.email.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(Self::format_subject(alert))
            .header(ContentType::TEXT_PLAIN)
            .body(Self::format_body(alert))
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(())
    }
}
