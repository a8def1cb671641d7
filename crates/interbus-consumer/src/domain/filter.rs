//! Accept/reject decision for inbound messages.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! ```text
//! timestamp < ignore_until          -> RejectTooOld
//! producer ∈ accept_from            -> Accept
//! ignore_from = Any | producer ∈ it -> RejectIgnoredProducer
//! addressee present and ≠ self      -> RejectWrongAddressee
//! otherwise                         -> Accept
//! ```

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};

use super::config::ConsumerConfig;
use super::message::RawMessage;

/// Outcome of [`MessageFilter::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    RejectIgnoredProducer,
    RejectWrongAddressee,
    RejectTooOld,
}

impl FilterDecision {
    #[must_use]
    pub fn is_accept(self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Whether this rejection counts towards the ignored-message counter.
    #[must_use]
    pub fn counts_as_ignored(self) -> bool {
        matches!(self, Self::RejectIgnoredProducer)
    }
}

impl fmt::Display for FilterDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Accept => "accepted",
            Self::RejectIgnoredProducer => "ignored producer",
            Self::RejectWrongAddressee => "addressed to another consumer",
            Self::RejectTooOld => "older than ignore-until",
        };
        f.write_str(reason)
    }
}

/// A set of canonical producer ids, or the wildcard matching every producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerSet {
    Any,
    Only(BTreeSet<String>),
}

impl ProducerSet {
    /// Empty set.
    #[must_use]
    pub fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    /// Whether the canonical producer id is covered.
    #[must_use]
    pub fn contains(&self, producer: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(ids) => ids.contains(producer),
        }
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl Default for ProducerSet {
    fn default() -> Self {
        Self::none()
    }
}

/// Canonical form of a producer id.
///
/// Spaces, dashes, dots and underscores collapse into a single `_`, every
/// capital that follows another character starts a new word, and the result
/// is lower-cased. `BillingService`, `billing-service` and `billing_service`
/// compare equal; `ABCService` becomes `a_b_c_service`, as producers
/// snake-case it.
pub fn canonical_producer_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);

    for c in raw.trim().chars() {
        let separator = matches!(c, '_' | '-' | ' ' | '.');
        if (separator || c.is_uppercase()) && !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        if c.is_uppercase() {
            out.extend(c.to_lowercase());
        } else if !separator {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Pure accept/reject function over a [`RawMessage`].
#[derive(Debug, Clone)]
pub struct MessageFilter {
    self_id: String,
    accept_from: BTreeSet<String>,
    ignore_from: ProducerSet,
    ignore_until: Option<DateTime<Utc>>,
}

impl MessageFilter {
    /// Build a filter. Ids are canonicalized here.
    pub fn new(
        self_id: &str,
        accept_from: impl IntoIterator<Item = String>,
        ignore_from: ProducerSet,
        ignore_until: Option<DateTime<Utc>>,
    ) -> Self {
        let ignore_from = match ignore_from {
            ProducerSet::Any => ProducerSet::Any,
            ProducerSet::Only(ids) => {
                ProducerSet::Only(ids.iter().map(|id| canonical_producer_id(id)).collect())
            }
        };
        Self {
            self_id: canonical_producer_id(self_id),
            accept_from: accept_from
                .into_iter()
                .map(|id| canonical_producer_id(&id))
                .collect(),
            ignore_from,
            ignore_until,
        }
    }

    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self::new(
            &config.service_id,
            config.accept_from.iter().cloned(),
            config.ignore_from.clone(),
            config.ignore_until,
        )
    }

    pub fn evaluate(&self, message: &RawMessage) -> FilterDecision {
        if let (Some(until), Some(ts)) = (self.ignore_until, message.effective_timestamp()) {
            if ts < until {
                return FilterDecision::RejectTooOld;
            }
        }

        let producer = canonical_producer_id(message.producer().unwrap_or_default());
        if self.accept_from.contains(&producer) {
            return FilterDecision::Accept;
        }
        if self.ignore_from.contains(&producer) {
            return FilterDecision::RejectIgnoredProducer;
        }

        match message.addressee() {
            Some(addressee) if canonical_producer_id(addressee) != self.self_id => {
                FilterDecision::RejectWrongAddressee
            }
            _ => FilterDecision::Accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::headers;
    use chrono::TimeZone;

    fn from(producer: &str) -> RawMessage {
        RawMessage::new("{}").with_header(headers::EVENT_SOURCE, producer)
    }

    fn filter(accept: &[&str], ignore: ProducerSet) -> MessageFilter {
        MessageFilter::new(
            "inventory",
            accept.iter().map(|s| s.to_string()),
            ignore,
            None,
        )
    }

    fn only(ids: &[&str]) -> ProducerSet {
        ProducerSet::Only(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_canonical_producer_id() {
        assert_eq!(canonical_producer_id("BillingService"), "billing_service");
        assert_eq!(canonical_producer_id("billing-service"), "billing_service");
        assert_eq!(canonical_producer_id(" Billing Service "), "billing_service");
        assert_eq!(canonical_producer_id("billing_service"), "billing_service");
        assert_eq!(canonical_producer_id("orders2Api"), "orders2_api");
        assert_eq!(canonical_producer_id("ABCService"), "a_b_c_service");
        assert_eq!(canonical_producer_id("a_b_c_service"), "a_b_c_service");
        assert_eq!(canonical_producer_id("HTTP-Gateway"), "h_t_t_p_gateway");
        assert_eq!(canonical_producer_id("_Billing"), "billing");
        assert_eq!(canonical_producer_id(""), "");
    }

    #[test]
    fn test_accept_from_overrides_ignore_all() {
        let f = filter(&["billing"], ProducerSet::Any);
        assert_eq!(f.evaluate(&from("Billing")), FilterDecision::Accept);
        assert_eq!(
            f.evaluate(&from("orders")),
            FilterDecision::RejectIgnoredProducer
        );
    }

    #[test]
    fn test_ignore_from_listed_producer() {
        let f = filter(&[], only(&["OrdersService"]));
        assert_eq!(
            f.evaluate(&from("orders-service")),
            FilterDecision::RejectIgnoredProducer
        );
        assert_eq!(f.evaluate(&from("billing")), FilterDecision::Accept);
    }

    #[test]
    fn test_legacy_source_header_is_matched() {
        let f = filter(&[], only(&["orders"]));
        let msg = RawMessage::new("{}").with_header(headers::SOURCE, "orders");
        assert_eq!(f.evaluate(&msg), FilterDecision::RejectIgnoredProducer);
    }

    #[test]
    fn test_wrong_addressee() {
        let f = filter(&[], ProducerSet::none());
        let msg = from("billing").with_header(headers::EVENT_ADDRESSEE, "shipping");
        assert_eq!(f.evaluate(&msg), FilterDecision::RejectWrongAddressee);

        let msg = from("billing").with_header(headers::EVENT_ADDRESSEE, "Inventory");
        assert_eq!(f.evaluate(&msg), FilterDecision::Accept);
    }

    #[test]
    fn test_accepted_producer_skips_addressee_check() {
        let f = filter(&["billing"], ProducerSet::none());
        let msg = from("billing").with_header(headers::EVENT_ADDRESSEE, "shipping");
        assert_eq!(f.evaluate(&msg), FilterDecision::Accept);
    }

    #[test]
    fn test_too_old_wins_over_accept() {
        let until = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let f = MessageFilter::new(
            "inventory",
            vec!["billing".to_string()],
            ProducerSet::none(),
            Some(until),
        );

        let old = from("billing").with_timestamp(until - chrono::Duration::seconds(1));
        assert_eq!(f.evaluate(&old), FilterDecision::RejectTooOld);

        let fresh = from("billing").with_timestamp(until);
        assert_eq!(f.evaluate(&fresh), FilterDecision::Accept);

        // no timestamp at all is never too old
        assert_eq!(f.evaluate(&from("billing")), FilterDecision::Accept);
    }

    #[test]
    fn test_only_ignored_producer_counts() {
        assert!(FilterDecision::RejectIgnoredProducer.counts_as_ignored());
        assert!(!FilterDecision::RejectTooOld.counts_as_ignored());
        assert!(!FilterDecision::RejectWrongAddressee.counts_as_ignored());
        assert!(!FilterDecision::Accept.counts_as_ignored());
    }
}
