//! Abstract operand stack and local variable array.
//!
//! Both are arrays of [`Slot`]s. A slot names the IR variable currently
//! holding its value; there is one variable per `(slot kind, value kind,
//! index)` triple, created lazily by the [`VariableFactory`]. Reusing the
//! same variable every time a position is written with the same kind keeps
//! variables single-kind and lets blocks reached along different paths agree
//! on which variable a slot holds at entry.
//!
//! Two-slot kinds (`Long`, `Double`) occupy the bound slot plus a
//! [`Slot::Filler`] above it. Pops and peeks step over fillers.

use cps_bytecode::Kind;
use cps_ir::{TermArena, Value, VarId, VarRole};
use rustc_hash::FxHashMap;

use crate::error::Malformed;

/// Which array a slot belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Local,
    Stack,
}

/// Contents of one stack or local position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Empty,
    /// Upper half of a two-slot value.
    Filler,
    Bound { var: VarId, kind: Kind },
}

impl Slot {
    /// The slot as a frame descriptor entry.
    pub fn value(self) -> Value {
        match self {
            Slot::Bound { var, .. } => Value::Var(var),
            Slot::Empty | Slot::Filler => Value::Undefined,
        }
    }
}

/// Whether a value of kind `found` satisfies a request for `expected`.
///
/// In unsafe code `Word` and `Reference` mix freely.
fn kind_matches(expected: Kind, found: Kind, relaxed: bool) -> bool {
    expected == found
        || (relaxed && expected.is_reference_or_word() && found.is_reference_or_word())
}

/// Creates one variable per slot position and kind.
#[derive(Debug, Default)]
pub struct VariableFactory {
    vars: FxHashMap<(SlotKind, Kind, u16), VarId>,
}

impl VariableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable for `kind` at `index` of `slot`, created on first use.
    pub fn variable(
        &mut self,
        arena: &mut TermArena,
        slot: SlotKind,
        kind: Kind,
        index: u16,
    ) -> VarId {
        let kind = kind.stack_kind();
        *self.vars.entry((slot, kind, index)).or_insert_with(|| {
            let role = match slot {
                SlotKind::Local => VarRole::Local(index),
                SlotKind::Stack => VarRole::Stack(index),
            };
            arena.fresh_var(kind, role)
        })
    }

    pub fn local(&mut self, arena: &mut TermArena, kind: Kind, index: u16) -> VarId {
        self.variable(arena, SlotKind::Local, kind, index)
    }

    pub fn stack(&mut self, arena: &mut TermArena, kind: Kind, index: u16) -> VarId {
        self.variable(arena, SlotKind::Stack, kind, index)
    }

    /// A variable outside any slot. Never reused.
    pub fn temporary(arena: &mut TermArena, kind: Kind) -> VarId {
        arena.fresh_var(kind, VarRole::Temporary)
    }
}

// ── Operand stack ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    slots: Vec<Slot>,
    max: u16,
}

impl Stack {
    pub fn new(max: u16) -> Self {
        Stack {
            slots: Vec::with_capacity(usize::from(max)),
            max,
        }
    }

    /// Number of occupied slots, fillers included.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Index the next pushed value of `kind` will occupy.
    pub fn next_index(&self, kind: Kind) -> Result<u16, Malformed> {
        let depth = self.slots.len();
        if depth + kind.stack_kind().width() > usize::from(self.max) {
            return Err(Malformed::StackOverflow { max: self.max });
        }
        u16::try_from(depth).map_err(|_| Malformed::StackOverflow { max: self.max })
    }

    /// Push `var` as a value of `kind`.
    pub fn push(&mut self, var: VarId, kind: Kind) -> Result<(), Malformed> {
        let kind = kind.stack_kind();
        self.next_index(kind)?;
        self.slots.push(Slot::Bound { var, kind });
        if kind.is_two_slot() {
            self.slots.push(Slot::Filler);
        }
        Ok(())
    }

    /// Pop the top value whatever its kind.
    pub fn pop_any(&mut self) -> Result<(VarId, Kind), Malformed> {
        let mut top = self.slots.pop().ok_or(Malformed::StackUnderflow)?;
        if top == Slot::Filler {
            top = self.slots.pop().ok_or(Malformed::StackUnderflow)?;
        }
        match top {
            Slot::Bound { var, kind } => Ok((var, kind)),
            Slot::Empty | Slot::Filler => Err(Malformed::StackUnderflow),
        }
    }

    /// Pop a value of `kind`.
    pub fn pop(&mut self, kind: Kind, relaxed: bool) -> Result<VarId, Malformed> {
        let expected = kind.stack_kind();
        let (var, found) = self.pop_any()?;
        if kind_matches(expected, found, relaxed) {
            Ok(var)
        } else {
            Err(Malformed::KindMismatch { expected, found })
        }
    }

    /// The top value, which must be of `kind`.
    pub fn peek(&self, kind: Kind, relaxed: bool) -> Result<VarId, Malformed> {
        let expected = kind.stack_kind();
        let mut slots = self.slots.iter().rev();
        let mut top = slots.next().ok_or(Malformed::StackUnderflow)?;
        if *top == Slot::Filler {
            top = slots.next().ok_or(Malformed::StackUnderflow)?;
        }
        match *top {
            Slot::Bound { var, kind: found } if kind_matches(expected, found, relaxed) => Ok(var),
            Slot::Bound { kind: found, .. } => Err(Malformed::KindMismatch { expected, found }),
            Slot::Empty | Slot::Filler => Err(Malformed::StackUnderflow),
        }
    }

    /// Pop whole values covering exactly `width` slots, returned bottom to
    /// top.
    pub fn take(&mut self, width: usize) -> Result<Vec<(VarId, Kind)>, Malformed> {
        let mut taken = Vec::new();
        let mut covered = 0;
        while covered < width {
            let (var, kind) = self.pop_any()?;
            covered += kind.width();
            taken.push((var, kind));
        }
        if covered != width {
            return Err(Malformed::SplitValue);
        }
        taken.reverse();
        Ok(taken)
    }

    /// Frame descriptor entries, bottom to top.
    pub fn values(&self) -> Vec<Value> {
        self.slots.iter().map(|slot| slot.value()).collect()
    }
}

// ── Local variables ─────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    slots: Vec<Slot>,
}

impl Frame {
    pub fn new(max_locals: u16) -> Self {
        Frame {
            slots: vec![Slot::Empty; usize::from(max_locals)],
        }
    }

    fn out_of_range(&self, index: u16) -> Malformed {
        Malformed::LocalOutOfRange {
            index,
            max: u16::try_from(self.slots.len()).unwrap_or(u16::MAX),
        }
    }

    /// Record that local `index` now holds `var`.
    ///
    /// Overwriting either half of a two-slot value clears the other half.
    pub fn store(&mut self, index: u16, var: VarId, kind: Kind) -> Result<(), Malformed> {
        let kind = kind.stack_kind();
        let at = usize::from(index);
        let last = at + kind.width().max(1) - 1;
        if last >= self.slots.len() {
            return Err(self.out_of_range(index));
        }
        if self.slots[at] == Slot::Filler && at > 0 {
            self.slots[at - 1] = Slot::Empty;
        }
        if let Slot::Bound { kind: old, .. } = self.slots[last] {
            if old.is_two_slot() && last + 1 < self.slots.len() {
                self.slots[last + 1] = Slot::Empty;
            }
        }
        self.slots[at] = Slot::Bound { var, kind };
        if kind.is_two_slot() {
            self.slots[at + 1] = Slot::Filler;
        }
        Ok(())
    }

    /// The variable local `index` holds; it must be of `kind`.
    pub fn load(&self, kind: Kind, index: u16, relaxed: bool) -> Result<VarId, Malformed> {
        let expected = kind.stack_kind();
        let slot = self
            .slots
            .get(usize::from(index))
            .ok_or_else(|| self.out_of_range(index))?;
        match *slot {
            Slot::Bound { var, kind: found } if kind_matches(expected, found, relaxed) => Ok(var),
            Slot::Bound { kind: found, .. } => Err(Malformed::KindMismatch { expected, found }),
            Slot::Empty | Slot::Filler => Err(Malformed::UndefinedLocal { index }),
        }
    }

    /// Load a `Reference` local, also accepting a `Word`.
    ///
    /// Returns the variable together with the kind it was stored as.
    pub fn load_reference_or_word(&self, index: u16) -> Result<(VarId, Kind), Malformed> {
        let var = self.load(Kind::Reference, index, true)?;
        match self.slots[usize::from(index)] {
            Slot::Bound { kind, .. } => Ok((var, kind)),
            Slot::Empty | Slot::Filler => Err(Malformed::UndefinedLocal { index }),
        }
    }

    /// Frame descriptor entries, in index order.
    pub fn values(&self) -> Vec<Value> {
        self.slots.iter().map(|slot| slot.value()).collect()
    }
}
