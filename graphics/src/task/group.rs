//! Composite present tasks.
//!
//! A [`TaskGroup`] owns an ordered list of member tasks, the producer to
//! consumer edges between them and the tables mapping the group's own IO
//! slots onto member IO. All of it is validated once, when the group is
//! built, and the execution order is computed at the same time.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use super::{PresentTask, SharedTask, TaskIo};

/// Side of a task's IO declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoDirection {
    /// Resources read.
    Input,
    /// Resources written.
    Output,
}

impl std::fmt::Display for IoDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Edge from one member's output to another member's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IngroupConnection {
    /// Producing member.
    pub producer: usize,
    /// Index into the producer's outputs.
    pub output: usize,
    /// Consuming member.
    pub consumer: usize,
    /// Index into the consumer's inputs.
    pub input: usize,
}

/// Maps one group-level IO slot onto one member IO entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupIoMapping {
    /// Group-level slot.
    pub slot: usize,
    /// Member index.
    pub member: usize,
    /// Index into the member's inputs or outputs.
    pub index: usize,
}

/// A member reading a resource written by a sibling it is not ordered after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadHazard {
    /// Reading member.
    pub reader: usize,
    /// Writing member.
    pub writer: usize,
    /// Shared resource.
    pub resource: TaskIo,
}

/// Reasons a group cannot be built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// A connection names a member that does not exist.
    #[error("connection {connection} references member {member}, group has {members}")]
    ConnectionMemberOutOfRange {
        /// Connection index.
        connection: usize,
        /// Offending member index.
        member: usize,
        /// Member count.
        members: usize,
    },
    /// A connection names an IO entry the member does not declare.
    #[error("connection {connection} references {direction} {index} of member '{member}'")]
    ConnectionIoOutOfRange {
        /// Connection index.
        connection: usize,
        /// Member name.
        member: String,
        /// Side of the member IO.
        direction: IoDirection,
        /// Offending IO index.
        index: usize,
    },
    /// A connection starts and ends at the same member.
    #[error("connection {connection} connects member '{member}' to itself")]
    SelfConnection {
        /// Connection index.
        connection: usize,
        /// Member name.
        member: String,
    },
    /// Producer output and consumer input name different resources.
    #[error("connection {connection} joins output {output} to input {input}")]
    ConnectionMismatch {
        /// Connection index.
        connection: usize,
        /// Producer output.
        output: TaskIo,
        /// Consumer input.
        input: TaskIo,
    },
    /// A resource is declared twice on the same side of the group.
    #[error("group {direction} {resource} declared twice")]
    DuplicateGroupIo {
        /// Side of the declaration.
        direction: IoDirection,
        /// Repeated resource.
        resource: TaskIo,
    },
    /// A declared group slot has no mapping.
    #[error("group {direction} slot {slot} has no mapping")]
    MissingMapping {
        /// Side of the slot.
        direction: IoDirection,
        /// Slot index.
        slot: usize,
    },
    /// A declared group slot has more than one mapping.
    #[error("group {direction} slot {slot} is mapped more than once")]
    DuplicateMapping {
        /// Side of the slot.
        direction: IoDirection,
        /// Slot index.
        slot: usize,
    },
    /// A mapping names a slot the group does not declare.
    #[error("mapping targets {direction} slot {slot}, group declares {slots}")]
    MappingSlotOutOfRange {
        /// Side of the slot.
        direction: IoDirection,
        /// Offending slot index.
        slot: usize,
        /// Declared slot count.
        slots: usize,
    },
    /// A mapping names a member that does not exist.
    #[error("{direction} slot {slot} maps to member {member}, group has {members}")]
    MappingMemberOutOfRange {
        /// Side of the slot.
        direction: IoDirection,
        /// Slot index.
        slot: usize,
        /// Offending member index.
        member: usize,
        /// Member count.
        members: usize,
    },
    /// A mapping names an IO entry the member does not declare.
    #[error("{direction} slot {slot} maps to {direction} {index} of member '{member}', which does not exist")]
    MappingIoOutOfRange {
        /// Side of the slot.
        direction: IoDirection,
        /// Slot index.
        slot: usize,
        /// Member name.
        member: String,
        /// Offending IO index.
        index: usize,
    },
    /// Group slot and mapped member IO name different resources.
    #[error("{direction} slot {slot} declares {declared} but maps to {mapped}")]
    MappingMismatch {
        /// Side of the slot.
        direction: IoDirection,
        /// Slot index.
        slot: usize,
        /// Resource declared by the group.
        declared: TaskIo,
        /// Resource declared by the member.
        mapped: TaskIo,
    },
    /// Two members write the same resource.
    #[error("{resource} is written by both '{first}' and '{second}'")]
    MultipleWriters {
        /// Shared output.
        resource: TaskIo,
        /// First writer.
        first: String,
        /// Second writer.
        second: String,
    },
    /// A group input is also written inside the group.
    #[error("group input {resource} is written by member '{writer}'")]
    AliasedInput {
        /// Aliased resource.
        resource: TaskIo,
        /// Writing member.
        writer: String,
    },
    /// The connections form a cycle.
    #[error("connections form a cycle through {}", .members.join(", "))]
    Cycle {
        /// Names of the members that could not be ordered.
        members: Vec<String>,
    },
}

/// A present task made of other present tasks.
#[derive(Debug)]
pub struct TaskGroup {
    name: String,
    inputs: Vec<TaskIo>,
    outputs: Vec<TaskIo>,
    members: Vec<SharedTask>,
    connections: Vec<IngroupConnection>,
    input_mappings: Vec<GroupIoMapping>,
    output_mappings: Vec<GroupIoMapping>,
    order: Vec<usize>,
    hazards: Vec<ReadHazard>,
}

impl TaskGroup {
    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group-level inputs, one per input slot.
    pub fn inputs(&self) -> &[TaskIo] {
        &self.inputs
    }

    /// Group-level outputs, one per output slot.
    pub fn outputs(&self) -> &[TaskIo] {
        &self.outputs
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[SharedTask] {
        &self.members
    }

    /// Edges between members.
    pub fn connections(&self) -> &[IngroupConnection] {
        &self.connections
    }

    /// Mapping of every input slot.
    pub fn input_mappings(&self) -> &[GroupIoMapping] {
        &self.input_mappings
    }

    /// Mapping of every output slot.
    pub fn output_mappings(&self) -> &[GroupIoMapping] {
        &self.output_mappings
    }

    /// Member indices in execution order: every producer precedes its
    /// consumers, ties follow insertion order.
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// Members that produce inputs of `member`.
    pub fn producers_of(&self, member: usize) -> impl Iterator<Item = usize> + '_ {
        self.connections
            .iter()
            .filter(move |c| c.consumer == member)
            .map(|c| c.producer)
    }

    /// Reads of sibling outputs that no connection orders.
    pub fn read_hazards(&self) -> &[ReadHazard] {
        &self.hazards
    }
}

/// Collects members, connections and mappings, then validates them in
/// [`build`](Self::build).
#[derive(Debug)]
pub struct TaskGroupBuilder {
    name: String,
    members: Vec<SharedTask>,
    connections: Vec<IngroupConnection>,
    inputs: Vec<TaskIo>,
    outputs: Vec<TaskIo>,
    input_mappings: Vec<GroupIoMapping>,
    output_mappings: Vec<GroupIoMapping>,
}

impl TaskGroupBuilder {
    /// Start a group called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            connections: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
        }
    }

    /// Add a member and return its index.
    pub fn add_member(&mut self, task: SharedTask) -> usize {
        self.members.push(task);
        self.members.len() - 1
    }

    /// Connect output `output` of `producer` to input `input` of `consumer`.
    pub fn connect(
        &mut self,
        producer: usize,
        output: usize,
        consumer: usize,
        input: usize,
    ) -> &mut Self {
        self.connections.push(IngroupConnection {
            producer,
            output,
            consumer,
            input,
        });
        self
    }

    /// Declare a group input slot and return its index.
    pub fn add_input(&mut self, io: impl Into<TaskIo>) -> usize {
        self.inputs.push(io.into());
        self.inputs.len() - 1
    }

    /// Declare a group output slot and return its index.
    pub fn add_output(&mut self, io: impl Into<TaskIo>) -> usize {
        self.outputs.push(io.into());
        self.outputs.len() - 1
    }

    /// Map input slot `slot` onto input `index` of `member`.
    pub fn map_input(&mut self, slot: usize, member: usize, index: usize) -> &mut Self {
        self.input_mappings.push(GroupIoMapping {
            slot,
            member,
            index,
        });
        self
    }

    /// Map output slot `slot` onto output `index` of `member`.
    pub fn map_output(&mut self, slot: usize, member: usize, index: usize) -> &mut Self {
        self.output_mappings.push(GroupIoMapping {
            slot,
            member,
            index,
        });
        self
    }

    /// Declare an input slot and map it in one step.
    pub fn expose_input(&mut self, io: impl Into<TaskIo>, member: usize, index: usize) -> usize {
        let slot = self.add_input(io);
        self.map_input(slot, member, index);
        slot
    }

    /// Declare an output slot and map it in one step.
    pub fn expose_output(&mut self, io: impl Into<TaskIo>, member: usize, index: usize) -> usize {
        let slot = self.add_output(io);
        self.map_output(slot, member, index);
        slot
    }

    /// Validate everything and build the group.
    pub fn build(self) -> Result<SharedTask, GroupError> {
        thistle_core::profile_function!();

        self.check_connections()?;
        check_unique_io(&self.inputs, IoDirection::Input)?;
        check_unique_io(&self.outputs, IoDirection::Output)?;
        self.check_mappings(IoDirection::Input)?;
        self.check_mappings(IoDirection::Output)?;
        self.check_writers()?;
        let order = self.topological_order()?;
        let hazards = self.find_hazards(&order);

        for hazard in &hazards {
            log::warn!(
                "Group '{}': '{}' reads {} written by unconnected sibling '{}'",
                self.name,
                self.members[hazard.reader].name(),
                hazard.resource,
                self.members[hazard.writer].name()
            );
        }
        log::debug!(
            "Built group '{}' ({} members, {} connections, order {:?})",
            self.name,
            self.members.len(),
            self.connections.len(),
            order
        );

        Ok(Arc::new(PresentTask::Group(TaskGroup {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            members: self.members,
            connections: self.connections,
            input_mappings: self.input_mappings,
            output_mappings: self.output_mappings,
            order,
            hazards,
        })))
    }

    fn check_connections(&self) -> Result<(), GroupError> {
        let members = self.members.len();
        for (i, c) in self.connections.iter().enumerate() {
            for member in [c.producer, c.consumer] {
                if member >= members {
                    return Err(GroupError::ConnectionMemberOutOfRange {
                        connection: i,
                        member,
                        members,
                    });
                }
            }
            let producer = &self.members[c.producer];
            let consumer = &self.members[c.consumer];
            if c.producer == c.consumer {
                return Err(GroupError::SelfConnection {
                    connection: i,
                    member: producer.name().to_owned(),
                });
            }
            let output = producer.outputs().get(c.output).copied().ok_or_else(|| {
                GroupError::ConnectionIoOutOfRange {
                    connection: i,
                    member: producer.name().to_owned(),
                    direction: IoDirection::Output,
                    index: c.output,
                }
            })?;
            let input = consumer.inputs().get(c.input).copied().ok_or_else(|| {
                GroupError::ConnectionIoOutOfRange {
                    connection: i,
                    member: consumer.name().to_owned(),
                    direction: IoDirection::Input,
                    index: c.input,
                }
            })?;
            if output != input {
                return Err(GroupError::ConnectionMismatch {
                    connection: i,
                    output,
                    input,
                });
            }
        }
        Ok(())
    }

    fn check_mappings(&self, direction: IoDirection) -> Result<(), GroupError> {
        let (declared, mappings) = match direction {
            IoDirection::Input => (&self.inputs, &self.input_mappings),
            IoDirection::Output => (&self.outputs, &self.output_mappings),
        };
        let mut mapped = vec![false; declared.len()];
        for m in mappings {
            let Some(seen) = mapped.get_mut(m.slot) else {
                return Err(GroupError::MappingSlotOutOfRange {
                    direction,
                    slot: m.slot,
                    slots: declared.len(),
                });
            };
            if *seen {
                return Err(GroupError::DuplicateMapping {
                    direction,
                    slot: m.slot,
                });
            }
            *seen = true;

            let member = self.members.get(m.member).ok_or(GroupError::MappingMemberOutOfRange {
                direction,
                slot: m.slot,
                member: m.member,
                members: self.members.len(),
            })?;
            let member_io = match direction {
                IoDirection::Input => member.inputs(),
                IoDirection::Output => member.outputs(),
            };
            let target = member_io.get(m.index).copied().ok_or_else(|| {
                GroupError::MappingIoOutOfRange {
                    direction,
                    slot: m.slot,
                    member: member.name().to_owned(),
                    index: m.index,
                }
            })?;
            if target != declared[m.slot] {
                return Err(GroupError::MappingMismatch {
                    direction,
                    slot: m.slot,
                    declared: declared[m.slot],
                    mapped: target,
                });
            }
        }
        match mapped.iter().position(|seen| !seen) {
            Some(slot) => Err(GroupError::MissingMapping { direction, slot }),
            None => Ok(()),
        }
    }

    fn check_writers(&self) -> Result<(), GroupError> {
        let mut writers: Vec<(TaskIo, usize)> = Vec::new();
        for (member, task) in self.members.iter().enumerate() {
            for &io in task.outputs() {
                if let Some(&(_, first)) = writers.iter().find(|(w, _)| *w == io) {
                    return Err(GroupError::MultipleWriters {
                        resource: io,
                        first: self.members[first].name().to_owned(),
                        second: task.name().to_owned(),
                    });
                }
                writers.push((io, member));
            }
        }
        for &io in &self.inputs {
            if let Some(&(_, writer)) = writers.iter().find(|(w, _)| *w == io) {
                return Err(GroupError::AliasedInput {
                    resource: io,
                    writer: self.members[writer].name().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<usize>, GroupError> {
        let count = self.members.len();
        let mut in_degree = vec![0usize; count];
        for c in &self.connections {
            in_degree[c.consumer] += 1;
        }
        let mut ready: BTreeSet<usize> = (0..count).filter(|&m| in_degree[m] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(member) = ready.pop_first() {
            order.push(member);
            for c in self.connections.iter().filter(|c| c.producer == member) {
                in_degree[c.consumer] -= 1;
                if in_degree[c.consumer] == 0 {
                    ready.insert(c.consumer);
                }
            }
        }

        if order.len() != count {
            let members = (0..count)
                .filter(|&m| in_degree[m] > 0)
                .map(|m| self.members[m].name().to_owned())
                .collect();
            return Err(GroupError::Cycle { members });
        }
        Ok(order)
    }

    fn find_hazards(&self, order: &[usize]) -> Vec<ReadHazard> {
        let count = self.members.len();
        let mut ancestors = vec![vec![false; count]; count];
        for &member in order {
            let mut reach = vec![false; count];
            for producer in self
                .connections
                .iter()
                .filter(|c| c.consumer == member)
                .map(|c| c.producer)
            {
                reach[producer] = true;
                for (r, &a) in reach.iter_mut().zip(&ancestors[producer]) {
                    *r |= a;
                }
            }
            ancestors[member] = reach;
        }

        let mut hazards = Vec::new();
        for (reader, task) in self.members.iter().enumerate() {
            for &resource in task.inputs() {
                for (writer, sibling) in self.members.iter().enumerate() {
                    if writer != reader
                        && sibling.outputs().contains(&resource)
                        && !ancestors[reader][writer]
                    {
                        hazards.push(ReadHazard {
                            reader,
                            writer,
                            resource,
                        });
                    }
                }
            }
        }
        hazards
    }
}

fn check_unique_io(ios: &[TaskIo], direction: IoDirection) -> Result<(), GroupError> {
    for (i, io) in ios.iter().enumerate() {
        if ios[..i].contains(io) {
            return Err(GroupError::DuplicateGroupIo {
                direction,
                resource: *io,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{BufferId, TextureId};
    use thistle_core::arena::Index;

    fn buffer(slot: u32) -> TaskIo {
        BufferId::from_index(Index::from_raw_parts(slot, 0)).into()
    }

    fn texture(slot: u32) -> TaskIo {
        TextureId::from_index(Index::from_raw_parts(slot, 0)).into()
    }

    fn cpu(name: &str, inputs: &[TaskIo], outputs: &[TaskIo]) -> SharedTask {
        PresentTask::cpu(
            name,
            inputs.iter().copied(),
            outputs.iter().copied(),
            |_| Ok(()),
        )
        .unwrap()
    }

    fn as_group(task: &SharedTask) -> &TaskGroup {
        match &**task {
            PresentTask::Group(group) => group,
            other => panic!("expected a group, got {other:?}"),
        }
    }

    #[test]
    fn test_chain_orders_producer_first() {
        let mut builder = TaskGroupBuilder::new("chain");
        let consumer = builder.add_member(cpu("consume", &[buffer(0)], &[texture(0)]));
        let producer = builder.add_member(cpu("produce", &[], &[buffer(0)]));
        builder.connect(producer, 0, consumer, 0);
        builder.expose_output(texture(0), consumer, 0);

        let task = builder.build().unwrap();
        let group = as_group(&task);
        assert_eq!(group.execution_order(), &[1, 0]);
        assert_eq!(task.outputs(), &[texture(0)]);
        assert_eq!(group.producers_of(consumer).collect::<Vec<_>>(), vec![producer]);
        assert!(group.read_hazards().is_empty());
    }

    #[test]
    fn test_unconnected_members_keep_insertion_order() {
        let mut builder = TaskGroupBuilder::new("parallel");
        builder.add_member(cpu("a", &[], &[buffer(0)]));
        builder.add_member(cpu("b", &[], &[buffer(1)]));
        builder.add_member(cpu("c", &[], &[buffer(2)]));
        let task = builder.build().unwrap();
        assert_eq!(as_group(&task).execution_order(), &[0, 1, 2]);
    }

    #[test]
    fn test_missing_mapping_rejected() {
        let mut builder = TaskGroupBuilder::new("unmapped");
        let member = builder.add_member(cpu("write", &[], &[buffer(0), buffer(1)]));
        builder.expose_output(buffer(0), member, 0);
        builder.add_output(buffer(1));

        assert_eq!(
            builder.build().unwrap_err(),
            GroupError::MissingMapping {
                direction: IoDirection::Output,
                slot: 1,
            }
        );
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let mut builder = TaskGroupBuilder::new("twice");
        let member = builder.add_member(cpu("read", &[buffer(0)], &[]));
        let slot = builder.expose_input(buffer(0), member, 0);
        builder.map_input(slot, member, 0);
        assert!(matches!(
            builder.build(),
            Err(GroupError::DuplicateMapping { slot: 0, .. })
        ));
    }

    #[test]
    fn test_mapping_mismatch_rejected() {
        let mut builder = TaskGroupBuilder::new("mismatch");
        let member = builder.add_member(cpu("write", &[], &[buffer(0)]));
        builder.expose_output(texture(0), member, 0);
        assert!(matches!(
            builder.build(),
            Err(GroupError::MappingMismatch { .. })
        ));

        let mut builder = TaskGroupBuilder::new("range");
        let member = builder.add_member(cpu("write", &[], &[buffer(0)]));
        builder.expose_output(buffer(0), member, 3);
        assert!(matches!(
            builder.build(),
            Err(GroupError::MappingIoOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut builder = TaskGroupBuilder::new("loop");
        let a = builder.add_member(cpu("a", &[buffer(1)], &[buffer(0)]));
        let b = builder.add_member(cpu("b", &[buffer(0)], &[buffer(1)]));
        builder.connect(a, 0, b, 0).connect(b, 0, a, 0);

        match builder.build().unwrap_err() {
            GroupError::Cycle { members } => assert_eq!(members, vec!["a", "b"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_connection_errors() {
        let mut builder = TaskGroupBuilder::new("self");
        let a = builder.add_member(cpu("a", &[buffer(0)], &[buffer(1)]));
        builder.connect(a, 0, a, 0);
        assert!(matches!(builder.build(), Err(GroupError::SelfConnection { .. })));

        let mut builder = TaskGroupBuilder::new("range");
        let a = builder.add_member(cpu("a", &[], &[buffer(0)]));
        builder.connect(a, 0, 5, 0);
        assert!(matches!(
            builder.build(),
            Err(GroupError::ConnectionMemberOutOfRange { member: 5, .. })
        ));

        let mut builder = TaskGroupBuilder::new("kind");
        let a = builder.add_member(cpu("a", &[], &[buffer(0)]));
        let b = builder.add_member(cpu("b", &[texture(0)], &[]));
        builder.connect(a, 0, b, 0);
        assert!(matches!(
            builder.build(),
            Err(GroupError::ConnectionMismatch { .. })
        ));
    }

    #[test]
    fn test_single_writer_enforced() {
        let mut builder = TaskGroupBuilder::new("writers");
        builder.add_member(cpu("first", &[], &[buffer(0)]));
        builder.add_member(cpu("second", &[], &[buffer(0)]));
        assert_eq!(
            builder.build().unwrap_err(),
            GroupError::MultipleWriters {
                resource: buffer(0),
                first: "first".to_string(),
                second: "second".to_string(),
            }
        );
    }

    #[test]
    fn test_aliased_input_rejected() {
        let mut builder = TaskGroupBuilder::new("alias");
        let reader = builder.add_member(cpu("read", &[buffer(0)], &[]));
        builder.add_member(cpu("write", &[], &[buffer(0)]));
        builder.expose_input(buffer(0), reader, 0);
        assert!(matches!(
            builder.build(),
            Err(GroupError::AliasedInput { .. })
        ));
    }

    #[test]
    fn test_unconnected_read_is_reported() {
        let mut builder = TaskGroupBuilder::new("hazard");
        let reader = builder.add_member(cpu("read", &[buffer(0)], &[]));
        let writer = builder.add_member(cpu("write", &[], &[buffer(0)]));
        let task = builder.build().unwrap();
        assert_eq!(
            as_group(&task).read_hazards(),
            &[ReadHazard {
                reader,
                writer,
                resource: buffer(0),
            }]
        );
    }

    #[test]
    fn test_transitive_order_is_not_a_hazard() {
        let mut builder = TaskGroupBuilder::new("transitive");
        let a = builder.add_member(cpu("a", &[], &[buffer(0), buffer(1)]));
        let b = builder.add_member(cpu("b", &[buffer(0)], &[buffer(2)]));
        let c = builder.add_member(cpu("c", &[buffer(2), buffer(1)], &[]));
        builder.connect(a, 0, b, 0).connect(b, 0, c, 0);
        let task = builder.build().unwrap();
        assert!(as_group(&task).read_hazards().is_empty());
        assert_eq!(as_group(&task).execution_order(), &[a, b, c]);
    }

    #[test]
    fn test_nested_group_exposes_inner_output() {
        let mut inner = TaskGroupBuilder::new("inner");
        let write = inner.add_member(cpu("write", &[], &[texture(1)]));
        inner.expose_output(texture(1), write, 0);
        let inner = inner.build().unwrap();

        let mut outer = TaskGroupBuilder::new("outer");
        let nested = outer.add_member(Arc::clone(&inner));
        let read = outer.add_member(cpu("read", &[texture(1)], &[buffer(9)]));
        outer.connect(nested, 0, read, 0);
        outer.expose_output(buffer(9), read, 0);
        let outer = outer.build().unwrap();

        assert_eq!(as_group(&outer).execution_order(), &[0, 1]);
        assert_eq!(Arc::strong_count(&inner), 2);
        drop(outer);
        assert_eq!(Arc::strong_count(&inner), 1);
    }
}
