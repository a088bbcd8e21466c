//! Selection checks and the fallback distribution.
//!
//! Pure functions over a snapshot of ticket types. Intake runs them on an
//! unlocked read (optimistic), fulfillment on rows locked inside its
//! transaction (authoritative).

use boxoffice_core::error::{EngineError, Result};
use boxoffice_core::types::{Selection, TicketType, TicketTypeId};
use std::collections::BTreeMap;

/// Units an order asks of one ticket type, next to what remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    /// Ticket type
    pub ticket_type_id: TicketTypeId,
    /// Remaining units before this order
    pub available: u32,
    /// Units this order takes
    pub requested: u32,
}

impl Demand {
    /// Remaining units once this order is applied.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.available.saturating_sub(self.requested)
    }
}

/// Validate `selections` against `ticket_types` and aggregate them per type.
///
/// The same type may appear in several selections; their units are summed.
/// The result is ordered by ticket type id, the order rows are locked in.
///
/// # Errors
///
/// - [`EngineError::InvalidQuantity`] if there are no selections or a quantity is zero
/// - [`EngineError::TicketTypeNotFound`] if a selection names a type not in `ticket_types`
/// - [`EngineError::InsufficientInventory`] if a type has fewer units left than requested
pub fn demand(ticket_types: &[TicketType], selections: &[Selection]) -> Result<Vec<Demand>> {
    if selections.is_empty() {
        return Err(EngineError::InvalidQuantity {
            ticket_type_id: None,
            quantity: 0,
        });
    }

    let mut requested: BTreeMap<TicketTypeId, u32> = BTreeMap::new();
    for selection in selections {
        if !ticket_types.iter().any(|t| t.id == selection.ticket_type_id) {
            return Err(EngineError::TicketTypeNotFound {
                ticket_type_id: selection.ticket_type_id,
            });
        }
        if selection.quantity == 0 {
            return Err(EngineError::InvalidQuantity {
                ticket_type_id: Some(selection.ticket_type_id),
                quantity: selection.quantity,
            });
        }
        let units = requested.entry(selection.ticket_type_id).or_insert(0);
        *units = units
            .checked_add(selection.quantity)
            .ok_or(EngineError::InvalidQuantity {
                ticket_type_id: Some(selection.ticket_type_id),
                quantity: selection.quantity,
            })?;
    }

    requested
        .into_iter()
        .map(|(ticket_type_id, requested)| {
            let available = ticket_types
                .iter()
                .find(|t| t.id == ticket_type_id)
                .map_or(0, |t| t.quantity);
            if requested > available {
                return Err(EngineError::InsufficientInventory {
                    ticket_type_id,
                    requested,
                    available,
                });
            }
            Ok(Demand {
                ticket_type_id,
                available,
                requested,
            })
        })
        .collect()
}

/// Synthesize selections for `quantity` units when an order's own are lost.
///
/// Degraded mode only: the result may name ticket types the buyer never
/// picked. Types with stock are filled one unit at a time in order, earlier
/// types first, never beyond a type's remaining quantity. A single stocked
/// type takes every unit.
///
/// # Errors
///
/// - [`EngineError::TicketCountMismatch`] if the event has no ticket types at all
/// - [`EngineError::InsufficientInventory`] if the stocked types cannot cover `quantity`
pub fn fallback_distribution(ticket_types: &[TicketType], quantity: u32) -> Result<Vec<Selection>> {
    let Some(first) = ticket_types.first() else {
        return Err(EngineError::TicketCountMismatch {
            expected: quantity,
            actual: 0,
        });
    };

    let stocked: Vec<&TicketType> = ticket_types.iter().filter(|t| t.quantity > 0).collect();
    let total: u64 = stocked.iter().map(|t| u64::from(t.quantity)).sum();
    if quantity == 0 || total < u64::from(quantity) {
        return Err(EngineError::InsufficientInventory {
            ticket_type_id: first.id,
            requested: quantity,
            available: u32::try_from(total).unwrap_or(u32::MAX),
        });
    }

    let mut allocated = vec![0u32; stocked.len()];
    let mut left = quantity;
    while left > 0 {
        for (slot, ticket_type) in allocated.iter_mut().zip(&stocked) {
            if left == 0 {
                break;
            }
            if *slot < ticket_type.quantity {
                *slot += 1;
                left -= 1;
            }
        }
    }

    Ok(stocked
        .iter()
        .zip(allocated)
        .filter(|(_, units)| *units > 0)
        .map(|(ticket_type, units)| Selection::new(ticket_type.id, units))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::types::{EventId, Money};

    fn stock(quantities: &[u32]) -> Vec<TicketType> {
        let event_id = EventId::new();
        let mut types: Vec<TicketType> = quantities
            .iter()
            .map(|&quantity| TicketType {
                id: TicketTypeId::new(),
                event_id,
                name: "Tier".to_string(),
                price: Money::from_minor(1_000),
                quantity,
            })
            .collect();
        types.sort_by_key(|t| t.id);
        types
    }

    #[test]
    fn test_demand_aggregates_repeated_types() {
        let types = stock(&[5]);
        let id = types[0].id;
        let demand = demand(&types, &[Selection::new(id, 2), Selection::new(id, 3)]).unwrap();
        assert_eq!(demand.len(), 1);
        assert_eq!(demand[0].requested, 5);
        assert_eq!(demand[0].remaining(), 0);
    }

    #[test]
    fn test_demand_names_the_short_type() {
        let types = stock(&[5, 1]);
        let short = types[1].id;
        let err = demand(&types, &[Selection::new(types[0].id, 1), Selection::new(short, 2)]).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientInventory {
                ticket_type_id: short,
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_demand_rejects_zero_and_foreign_types() {
        let types = stock(&[5]);
        assert!(matches!(
            demand(&types, &[Selection::new(types[0].id, 0)]),
            Err(EngineError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            demand(&types, &[Selection::new(TicketTypeId::new(), 1)]),
            Err(EngineError::TicketTypeNotFound { .. })
        ));
        assert!(matches!(
            demand(&types, &[]),
            Err(EngineError::InvalidQuantity { ticket_type_id: None, .. })
        ));
    }

    #[test]
    fn test_fallback_single_type_takes_everything() {
        let types = stock(&[0, 10]);
        let selections = fallback_distribution(&types, 4).unwrap();
        assert_eq!(selections, vec![Selection::new(types[1].id, 4)]);
    }

    #[test]
    fn test_fallback_round_robin_respects_caps() {
        let types = stock(&[1, 5, 2]);
        let selections = fallback_distribution(&types, 6).unwrap();
        assert_eq!(
            selections,
            vec![
                Selection::new(types[0].id, 1),
                Selection::new(types[1].id, 3),
                Selection::new(types[2].id, 2),
            ]
        );
    }

    #[test]
    fn test_fallback_exhaustion() {
        let types = stock(&[1, 1]);
        assert!(matches!(
            fallback_distribution(&types, 3),
            Err(EngineError::InsufficientInventory { requested: 3, available: 2, .. })
        ));
        assert_eq!(
            fallback_distribution(&[], 2),
            Err(EngineError::TicketCountMismatch { expected: 2, actual: 0 })
        );
    }
}
