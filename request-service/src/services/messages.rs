//! Wording for payment notifications.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{Audience, NotificationKind};

/// Facts about the payment that every message draws from.
#[derive(Debug, Clone)]
pub struct PaymentContext<'a> {
    pub request_number: &'a str,
    pub payment_phase: &'a str,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub days_until_due: i64,
    pub currency_symbol: &'a str,
    pub customer_name: &'a str,
}

impl PaymentContext<'_> {
    fn amount(&self) -> String {
        format!("{}{}", self.currency_symbol, format_thousands(self.amount))
    }

    fn due(&self) -> String {
        self.due_date.format("%B %-d, %Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub body: String,
}

pub fn compose(kind: NotificationKind, audience: Audience, ctx: &PaymentContext<'_>) -> ComposedMessage {
    let subject = match kind {
        NotificationKind::Overdue => format!(
            "Payment OVERDUE: {} for request {}",
            ctx.payment_phase, ctx.request_number
        ),
        NotificationKind::DueToday => format!(
            "Payment due today: {} for request {}",
            ctx.payment_phase, ctx.request_number
        ),
        NotificationKind::Reminder => format!(
            "Payment reminder: {} for request {} is due on {}",
            ctx.payment_phase,
            ctx.request_number,
            ctx.due()
        ),
        NotificationKind::DeadlineSet => format!(
            "Payment deadline set: {} for request {}",
            ctx.payment_phase, ctx.request_number
        ),
    };

    let body = match (kind, audience) {
        (NotificationKind::Overdue, Audience::Customer) => format!(
            "Your {} payment for service request {} is now OVERDUE. It was due on {} ({} day(s) ago). Amount due: {}. Please settle the balance as soon as possible.",
            ctx.payment_phase,
            ctx.request_number,
            ctx.due(),
            -ctx.days_until_due,
            ctx.amount()
        ),
        (NotificationKind::Overdue, Audience::Admin) => format!(
            "Follow up required: the {} payment of {} from {} for request {} is overdue by {} day(s) (due {}).",
            ctx.payment_phase,
            ctx.amount(),
            ctx.customer_name,
            ctx.request_number,
            -ctx.days_until_due,
            ctx.due()
        ),
        (NotificationKind::Overdue, Audience::Staff) => format!(
            "The {} payment of {} for request {} ({}) is overdue since {}. Please follow up with the client.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.request_number,
            ctx.customer_name,
            ctx.due()
        ),
        (NotificationKind::DueToday, Audience::Customer) => format!(
            "Your {} payment of {} for service request {} is due today. Please upload your proof of payment once settled.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.request_number
        ),
        (NotificationKind::DueToday, _) => format!(
            "The {} payment of {} from {} for request {} is due today.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.customer_name,
            ctx.request_number
        ),
        (NotificationKind::Reminder, Audience::Customer) => format!(
            "This is a reminder that your {} payment of {} for service request {} is due in {} days, on {}.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.request_number,
            ctx.days_until_due,
            ctx.due()
        ),
        (NotificationKind::Reminder, _) => format!(
            "Advance notice: the {} payment of {} from {} for request {} falls due on {}.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.customer_name,
            ctx.request_number,
            ctx.due()
        ),
        (NotificationKind::DeadlineSet, Audience::Customer) => format!(
            "A payment deadline has been set for your {} payment of {} for service request {}. Please pay on or before {}.",
            ctx.payment_phase,
            ctx.amount(),
            ctx.request_number,
            ctx.due()
        ),
        (NotificationKind::DeadlineSet, _) => format!(
            "A payment deadline of {} has been set for the {} payment of {} from {} for request {}.",
            ctx.due(),
            ctx.payment_phase,
            ctx.amount(),
            ctx.customer_name,
            ctx.request_number
        ),
    };

    ComposedMessage { subject, body }
}

/// `1234567.5` -> `1,234,567.50`
fn format_thousands(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, fraction)
}
