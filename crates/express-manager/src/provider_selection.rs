use std::cmp::Ordering;

use rust_decimal::Decimal;
use tracing::debug;

use crate::{ExpressAvailableQuote, ExpressManagerRestriction, ExpressProvider, ExpressQuote, QuoteState};

/// Select the best quote from the settled quote states of all requested providers.
///
/// `quotes` must be in provider catalog order. The winner is the quote with the
/// highest expected amount; ties go to the lowest fee (a missing fee counts as
/// zero) and then to the provider listed first in the catalog.
///
/// Returns `None` when no provider returned a quote.
pub(crate) fn select_best_quote(
    quotes: &[ExpressAvailableQuote],
) -> Option<(&ExpressProvider, &ExpressQuote)> {
    let best = quotes
        .iter()
        .enumerate()
        .filter_map(|(index, available)| {
            available
                .state
                .quote()
                .map(|quote| (index, &available.provider, quote))
        })
        .min_by(|(a_index, _, a), (b_index, _, b)| {
            compare_quotes(a, b).then_with(|| a_index.cmp(b_index))
        })
        .map(|(_, provider, quote)| (provider, quote));

    if let Some((provider, quote)) = best {
        debug!(
            "Selected provider {} with expected amount {} (fee: {:?}) from {} provider(s)",
            provider.id,
            quote.expect_amount,
            quote.fee,
            quotes.len()
        );
    }
    best
}

/// Orders quotes from best to worst.
fn compare_quotes(a: &ExpressQuote, b: &ExpressQuote) -> Ordering {
    b.expect_amount.cmp(&a.expect_amount).then_with(|| {
        a.fee
            .unwrap_or(Decimal::ZERO)
            .cmp(&b.fee.unwrap_or(Decimal::ZERO))
    })
}

/// Combines the restrictions of all providers into the one reported to the caller.
///
/// When every provider rejected the amount as too small, the smallest minimum wins,
/// and symmetrically the largest maximum when every provider rejected it as too big.
/// Mixed restrictions report the first one in catalog order.
pub(crate) fn aggregate_restriction(
    quotes: &[ExpressAvailableQuote],
) -> Option<ExpressManagerRestriction> {
    let restrictions: Vec<&ExpressManagerRestriction> = quotes
        .iter()
        .filter_map(|available| match &available.state {
            QuoteState::Restriction(restriction) => Some(restriction),
            _ => None,
        })
        .collect();

    let min_amounts: Vec<Decimal> = restrictions
        .iter()
        .filter_map(|r| match r {
            ExpressManagerRestriction::TooSmallAmount { min_amount } => Some(*min_amount),
            _ => None,
        })
        .collect();
    if !min_amounts.is_empty() && min_amounts.len() == restrictions.len() {
        return min_amounts
            .into_iter()
            .min()
            .map(|min_amount| ExpressManagerRestriction::TooSmallAmount { min_amount });
    }

    let max_amounts: Vec<Decimal> = restrictions
        .iter()
        .filter_map(|r| match r {
            ExpressManagerRestriction::TooBigAmount { max_amount } => Some(*max_amount),
            _ => None,
        })
        .collect();
    if !max_amounts.is_empty() && max_amounts.len() == restrictions.len() {
        return max_amounts
            .into_iter()
            .max()
            .map(|max_amount| ExpressManagerRestriction::TooBigAmount { max_amount });
    }

    restrictions.first().map(|r| (*r).clone())
}
