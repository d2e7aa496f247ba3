use crate::models::{NotificationSubscription, WhaleEvent};

/// Whether `sub` wants to hear about `event`.
///
/// Active, value at or above the minimum, and the event's chain and type
/// pass the allow-lists. A missing or empty list allows everything.
pub fn matches(event: &WhaleEvent, sub: &NotificationSubscription) -> bool {
    sub.active
        && event.usd_value >= sub.min_usd_value
        && allows(sub.blockchains.as_deref(), &event.blockchain)
        && allows(sub.event_types.as_deref(), event.event_type.as_str())
}

fn allows(list: Option<&[String]>, value: &str) -> bool {
    match list {
        None | Some([]) => true,
        Some(items) => items.iter().any(|item| item == value),
    }
}

/// Subscriptions from `subs` that match `event`, in input order.
pub fn match_subscriptions<'a>(
    event: &WhaleEvent,
    subs: &'a [NotificationSubscription],
) -> Vec<&'a NotificationSubscription> {
    subs.iter().filter(|sub| matches(event, sub)).collect()
}
