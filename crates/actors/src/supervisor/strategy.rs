/// How a supervisor reacts to the death of one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestartStrategy {
	/// Restart only the dead child.
	#[default]
	OneForOne,
	/// Stop every child and restart them all.
	AllForOne,
	/// Stop and restart the dead child and every child added after it.
	RestForOne,
	/// Give up and die instead of restarting.
	Escalate,
}

/// When a child is eligible for restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChildMode {
	/// Always restarted.
	#[default]
	Permanent,
	/// Restarted only after an abnormal death.
	Transient,
	/// Never restarted; removed once it dies.
	Temporary,
}

/// Reaction to one child death, over child indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
	/// Run the restart routine on the dead child alone.
	One,
	/// Stop every child from this index on, then run the restart routine on each.
	From(usize),
	GiveUp,
}

impl RestartStrategy {
	/// Plans the reaction to the death of the child at `index`.
	///
	/// Deaths that never lead to a restart (temporary children, transient
	/// children that ended normally) only ever touch the dead child.
	pub(crate) fn plan(self, mode: ChildMode, natural: bool, index: usize) -> Plan {
		let removal_only = mode == ChildMode::Temporary || (mode == ChildMode::Transient && natural);
		if removal_only {
			return Plan::One;
		}
		match self {
			Self::OneForOne => Plan::One,
			Self::AllForOne => Plan::From(0),
			Self::RestForOne => Plan::From(index),
			Self::Escalate => Plan::GiveUp,
		}
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::OneForOne => "one_for_one",
			Self::AllForOne => "all_for_one",
			Self::RestForOne => "rest_for_one",
			Self::Escalate => "escalate",
		}
	}
}
