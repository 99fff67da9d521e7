// =============================================================================
// Aggregator Guard — enforces the exchange-native-only data rule at runtime
// =============================================================================
//
// `Venue` already makes aggregator sources unrepresentable for anything that
// asks for L1/L2 microstructure. This guard is the belt to that type-system
// suspender: it validates `Source` values coming from config or a future
// provider plugin before they ever get turned into a `Venue`, and it runs a
// startup self-test so a misconfigured deployment fails loud instead of
// silently sourcing spread/depth from an aggregator.

use crate::error::ProviderError;
use crate::types::{Source, Venue};

const BANNED_AGGREGATORS: &[&str] = &["coingecko", "dexscreener", "coinpaprika", "coinmarketcap"];

pub struct AggregatorGuard;

impl AggregatorGuard {
    /// Reject any `Source` that isn't an exchange-native venue for data
    /// types where microstructure integrity matters (L1/L2 book, trades).
    pub fn validate_l1_l2_source(source: &Source) -> Result<Venue, ProviderError> {
        match source {
            Source::ExchangeNative(venue) => Ok(*venue),
            Source::Aggregator(name) => Err(ProviderError::AggregatorViolation {
                source: name.clone(),
                data_type: "L1/L2 microstructure".to_string(),
                reason: "aggregators are not permitted as a source of spread/depth/VADR data"
                    .to_string(),
            }),
        }
    }

    /// Startup self-test: confirms the banned list and the exchange-native
    /// list are disjoint and that every `Venue` variant resolves cleanly.
    /// Intended to be called once during process bootstrap; panics are
    /// acceptable there since a guard bug must stop startup, not surface at
    /// scan time.
    pub fn self_test() {
        for venue in Venue::all() {
            let name = venue.name();
            assert!(
                !BANNED_AGGREGATORS.contains(&name),
                "venue {name} collides with the banned aggregator list"
            );
            let source = Source::ExchangeNative(*venue);
            assert!(Self::validate_l1_l2_source(&source).is_ok());
        }
        for banned in BANNED_AGGREGATORS {
            let source = Source::Aggregator(banned.to_string());
            assert!(Self::validate_l1_l2_source(&source).is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes() {
        AggregatorGuard::self_test();
    }

    #[test]
    fn exchange_native_source_passes() {
        let source = Source::ExchangeNative(Venue::Kraken);
        assert_eq!(AggregatorGuard::validate_l1_l2_source(&source).unwrap(), Venue::Kraken);
    }

    #[test]
    fn aggregator_source_is_rejected() {
        let source = Source::Aggregator("coingecko".to_string());
        assert!(matches!(
            AggregatorGuard::validate_l1_l2_source(&source),
            Err(ProviderError::AggregatorViolation { .. })
        ));
    }
}
