use itertools::Itertools;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::data::{
    Faculty, GroupKey, InfeasibilityReason, InfeasibleGroup, Room, RoomId, RoomKind, SlotId,
    TimeSlot,
};
use crate::groups::SessionGroup;

/// A (group, slot, room) triple that passes every static check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub group: GroupKey,
    pub slot: SlotId,
    pub room: RoomId,
}

/// Whether a room of `kind` can host a group with the given lab requirement.
pub fn room_type_fits(needs_lab: bool, kind: RoomKind) -> bool {
    !needs_lab || kind == RoomKind::Lab
}

/// Lists the feasible (slot, room) pairs for `group` when taught by `faculty`,
/// ordered by slot id then room order.
///
/// An empty result, or fewer distinct slots than required sessions, is
/// returned as an [`InfeasibleGroup`] diagnostic.
pub fn generate(
    group: &SessionGroup,
    time_slots: &[TimeSlot],
    rooms: &[Room],
    faculty: &Faculty,
) -> Result<Vec<Candidate>, InfeasibleGroup> {
    let slots: Vec<SlotId> = time_slots
        .iter()
        .map(|t| t.id)
        .filter(|id| faculty.available_slots.contains(id))
        .sorted()
        .collect();
    let typed: Vec<&Room> = rooms
        .iter()
        .filter(|r| room_type_fits(group.needs_lab, r.kind))
        .collect();
    let sized: Vec<&Room> = typed
        .iter()
        .copied()
        .filter(|r| r.capacity >= group.size())
        .collect();

    let candidates: Vec<Candidate> = slots
        .iter()
        .flat_map(|slot| {
            sized
                .iter()
                .filter(move |r| r.available_slots.contains(slot))
                .map(move |r| Candidate {
                    group: group.key.clone(),
                    slot: *slot,
                    room: r.id.clone(),
                })
        })
        .collect();
    trace!(
        "Group {} taught by {}: {} slots, {} typed rooms, {} sized rooms, {} candidates",
        group.key,
        faculty.id,
        slots.len(),
        typed.len(),
        sized.len(),
        candidates.len()
    );

    if candidates.is_empty() {
        if group.required_sessions == 0 {
            return Ok(candidates);
        }
        return Err(InfeasibleGroup::for_group(
            &group.key,
            InfeasibilityReason::NoCandidates {
                faculty_slots: slots.len(),
                rooms_by_type: typed.len(),
                rooms_by_capacity: sized.len(),
                pairs_by_room_availability: 0,
            },
        ));
    }

    let distinct_slots = candidates.iter().map(|c| c.slot).dedup().count();
    if distinct_slots < group.required_sessions as usize {
        return Err(InfeasibleGroup::for_group(
            &group.key,
            InfeasibilityReason::InsufficientSlots {
                required: group.required_sessions,
                available: distinct_slots,
            },
        ));
    }
    Ok(candidates)
}
