//! Per-frame lane occupancy.
//!
//! Every section owns `ROAD_OCCUPATION_SLOTS_MAX * ROAD_LANES` consecutive
//! [`Occupation`] records, addressed as `road * ROAD_INDEX_MULTIPLIER +
//! slot * ROAD_LANES + lane`. The grid is zeroed at the start of each frame,
//! then rebuilt in four steps:
//!
//! 1. **Aliasing** – every vehicle appends a [`SlotWrite`] for each slot its
//!    footprint covers (current lane, plus the wanted lane while switching).
//!    Writers run in parallel and append into per-worker shards.
//! 2. **Fill** – one sequential reduction folds all shards into the grid,
//!    keeping the lowest vehicle id and the lowest speed per slot.
//! 3. **Gap fill** – empty slots are back-filled from the end of the section
//!    with the speed of the next occupant ahead, rising by
//!    [`GAP_FILL_SPEED_STEP`] per empty slot.
//! 4. **Gap adjustment / gap fill 2** – the successor's first slot is folded
//!    into the predecessor's last slot, then minimum speeds are carried
//!    upstream so a blocked slot caps everything behind it.
//!
//! Merges with several predecessors only see the section recorded in
//! `link_next`; there is no `link_prev`.

use rayon::prelude::*;

use super::constants::*;
use super::network::RoadNetwork;
use super::VehiclePathing;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Occupation {
    /// Lowest id of the vehicles covering this slot, 0 when empty.
    pub occupied: u32,
    /// Speed ceiling for a vehicle entering this slot.
    pub speed: f32,
}

impl Occupation {
    pub fn is_occupied(&self) -> bool {
        self.occupied != 0
    }

    fn merge(&mut self, write: SlotWrite) {
        if self.occupied != 0 {
            self.occupied = self.occupied.min(write.id);
            self.speed = self.speed.min(write.speed);
        } else {
            self.occupied = write.id;
            self.speed = write.speed;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotWrite {
    pub id: u32,
    pub speed: f32,
}

/// Append-only slot writes, one shard per worker chunk.
#[derive(Debug, Clone, Default)]
pub struct SlotWriteBuffer {
    shards: Vec<Vec<(usize, SlotWrite)>>,
}

impl SlotWriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.shards.clear();
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, SlotWrite)> {
        self.shards.iter().flatten()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OccupancyGrid {
    slots: Vec<Occupation>,
    sections: usize,
}

impl OccupancyGrid {
    pub fn new(sections: usize) -> Self {
        Self {
            slots: vec![Occupation::default(); sections * ROAD_INDEX_MULTIPLIER],
            sections,
        }
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Linear index of `(road, slot, lane)`.
    ///
    /// Panics if `slot` or `lane` is outside the fixed layout.
    pub fn index(road: usize, slot: usize, lane: usize) -> usize {
        assert!(slot < ROAD_OCCUPATION_SLOTS_MAX, "occupancy slot {} out of range", slot);
        assert!(lane < ROAD_LANES, "lane {} out of range", lane);
        road * ROAD_INDEX_MULTIPLIER + slot * ROAD_LANES + lane
    }

    pub fn try_index(&self, road: usize, slot: usize, lane: usize) -> Option<usize> {
        if road >= self.sections || slot >= ROAD_OCCUPATION_SLOTS_MAX || lane >= ROAD_LANES {
            return None;
        }
        Some(Self::index(road, slot, lane))
    }

    pub fn get(&self, road: usize, slot: usize, lane: usize) -> Occupation {
        self.slots[Self::index(road, slot, lane)]
    }

    pub fn get_mut(&mut self, road: usize, slot: usize, lane: usize) -> &mut Occupation {
        &mut self.slots[Self::index(road, slot, lane)]
    }

    pub fn as_slice(&self) -> &[Occupation] {
        &self.slots
    }

    /// Zeroes every slot, resizing first if the network changed size.
    pub fn clear(&mut self, sections: usize) {
        if sections != self.sections {
            *self = Self::new(sections);
            return;
        }
        self.slots
            .par_iter_mut()
            .for_each(|o| *o = Occupation::default());
    }

    /// True if any slot in `start..=end` of `(road, lane)` is occupied.
    pub fn any_occupied(&self, road: usize, lane: usize, start: usize, end: usize) -> bool {
        (start..=end).any(|slot| self.get(road, slot, lane).is_occupied())
    }

    /// True if a vehicle other than `vehicle_id` occupies `start..=end`.
    pub fn occupied_by_other(
        &self,
        road: usize,
        lane: usize,
        start: usize,
        end: usize,
        vehicle_id: u32,
    ) -> bool {
        (start..=end).any(|slot| {
            let o = self.get(road, slot, lane);
            o.is_occupied() && o.occupied != vehicle_id
        })
    }
}

/// Calls `visit(road, slot)` for every slot covered by a footprint of
/// `[curve_pos - half_len, curve_pos + half_len]` on `road`. Slots past the
/// end of the section land in `link_next`; without a successor they clamp to
/// the last slot. The back edge clamps to slot 0.
pub fn footprint_slots(
    network: &RoadNetwork,
    road: usize,
    curve_pos: f32,
    mut visit: impl FnMut(usize, usize),
) {
    let rs = network.section(road);
    let limit = rs.occupation_limit as i64;
    let back = rs.raw_slot(curve_pos - rs.vehicle_half_len).max(0);
    let front = rs.raw_slot(curve_pos + rs.vehicle_half_len).max(back);

    let mut last = None;
    for raw in back..=front {
        let target = if raw < limit {
            (road, raw as usize)
        } else if let Some(next) = rs.link_next {
            let next_limit = network.section(next).occupation_limit;
            (next, ((raw - limit) as usize).min(next_limit - 1))
        } else {
            (road, rs.occupation_limit - 1)
        };

        if last != Some(target) {
            visit(target.0, target.1);
            last = Some(target);
        }
    }
}

/// Appends the footprint of every vehicle into `buffer`.
pub fn occupation_aliasing(
    network: &RoadNetwork,
    vehicles: &[VehiclePathing],
    buffer: &mut SlotWriteBuffer,
) {
    buffer.shards = vehicles
        .par_iter()
        .fold(Vec::new, |mut shard, vehicle| {
            let write = SlotWrite {
                id: vehicle.vehicle_id.raw(),
                speed: vehicle.speed,
            };
            let mut occupy = |lane: u8| {
                footprint_slots(network, vehicle.road_index, vehicle.curve_pos, |road, slot| {
                    shard.push((OccupancyGrid::index(road, slot, lane as usize), write));
                });
            };

            occupy(vehicle.lane_index);
            if vehicle.is_switching_lanes() {
                occupy(vehicle.wanted_lane_index);
            }
            shard
        })
        .collect();
}

/// Folds every buffered write into the grid with min-reduction.
pub fn occupation_fill(grid: &mut OccupancyGrid, buffer: &SlotWriteBuffer) {
    for &(index, write) in buffer.iter() {
        grid.slots[index].merge(write);
    }
}

/// Back-fills empty slots with the speed of the occupant ahead, plus a small
/// step per slot of free road.
pub fn occupation_gap_fill(grid: &mut OccupancyGrid) {
    grid.slots
        .par_chunks_mut(ROAD_INDEX_MULTIPLIER)
        .for_each(|section| {
            for lane in 0..ROAD_LANES {
                let mut last_speed = f32::MAX;
                for slot in (0..ROAD_OCCUPATION_SLOTS_MAX).rev() {
                    let occupation = &mut section[slot * ROAD_LANES + lane];
                    if occupation.is_occupied() {
                        last_speed = occupation.speed;
                    } else {
                        occupation.speed = last_speed;
                        last_speed += GAP_FILL_SPEED_STEP;
                    }
                }
            }
        });
}

/// Folds each successor's first slot into its predecessor's last slot.
pub fn occupation_gap_adjustment(grid: &mut OccupancyGrid, network: &RoadNetwork) {
    let updates: Vec<(usize, Occupation)> = network
        .sections
        .par_iter()
        .enumerate()
        .filter_map(|(road, rs)| rs.link_next.map(|next| (road, rs, next)))
        .flat_map_iter(|(road, rs, next)| {
            let grid = &*grid;
            (0..ROAD_LANES).map(move |lane| {
                let dst_index = OccupancyGrid::index(road, rs.occupation_limit - 1, lane);
                let src = grid.get(next, 0, lane);
                let mut dst = grid.slots[dst_index];

                if dst.is_occupied() {
                    dst.speed = dst.speed.min(src.speed);
                    dst.occupied = if src.is_occupied() {
                        dst.occupied.min(src.occupied)
                    } else {
                        dst.occupied
                    };
                } else {
                    dst = src;
                }
                (dst_index, dst)
            })
        })
        .collect();

    for (index, occupation) in updates {
        grid.slots[index] = occupation;
    }
}

/// Carries the minimum speed upstream so a slow slot caps every slot behind
/// it. Empty slots keep the per-slot gradient; occupied slots take the plain
/// minimum.
pub fn occupation_gap_fill_2(grid: &mut OccupancyGrid) {
    grid.slots
        .par_chunks_mut(ROAD_INDEX_MULTIPLIER)
        .for_each(|section| {
            for lane in 0..ROAD_LANES {
                for slot in (0..ROAD_OCCUPATION_SLOTS_MAX - 1).rev() {
                    let ahead = section[(slot + 1) * ROAD_LANES + lane].speed;
                    let occupation = &mut section[slot * ROAD_LANES + lane];
                    let ceiling = if occupation.is_occupied() {
                        ahead
                    } else {
                        ahead + GAP_FILL_SPEED_STEP
                    };
                    occupation.speed = occupation.speed.min(ceiling);
                }
            }
        });
}

/// Runs the full clear, aliasing, fill and gap sequence in one call.
pub fn rebuild_occupancy(
    grid: &mut OccupancyGrid,
    buffer: &mut SlotWriteBuffer,
    network: &RoadNetwork,
    vehicles: &[VehiclePathing],
) {
    grid.clear(network.len());
    buffer.clear();
    occupation_aliasing(network, vehicles, buffer);
    occupation_fill(grid, buffer);
    occupation_gap_fill(grid);
    occupation_gap_adjustment(grid, network);
    occupation_gap_fill_2(grid);
}
