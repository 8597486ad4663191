/// Differentiation mode of a node.
///
/// Combination table used when an operation joins two operands:
///
/// | lhs \ rhs | Forward | Reverse | Mix | Constant |
/// |-----------|---------|---------|-----|----------|
/// | Forward   | Forward | Mix     | Mix | Forward  |
/// | Reverse   | Mix     | Reverse | Mix | Reverse  |
/// | Mix       | Mix     | Mix     | Mix | Mix      |
/// | Constant  | Forward | Reverse | Mix | Constant |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Derivatives are computed eagerly when the node is built.
    #[default]
    Forward,
    /// Derivatives are computed lazily by a backward pass.
    Reverse,
    /// The graph mixes both: the node defers, and forward sub-results are
    /// merged into the backward pass.
    Mix,
    /// No named input below this node.
    Constant,
}

impl Mode {
    pub fn combine(self, other: Mode) -> Mode {
        match (self, other) {
            (Mode::Constant, mode) | (mode, Mode::Constant) => mode,
            (lhs, rhs) if lhs == rhs => lhs,
            _ => Mode::Mix,
        }
    }

    /// Whether a node in this mode gets its derivative map at construction.
    pub fn is_eager(self) -> bool {
        matches!(self, Mode::Forward | Mode::Constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_table() {
        use Mode::*;
        assert_eq!(Forward.combine(Forward), Forward);
        assert_eq!(Forward.combine(Reverse), Mix);
        assert_eq!(Reverse.combine(Forward), Mix);
        assert_eq!(Reverse.combine(Reverse), Reverse);
        assert_eq!(Mix.combine(Forward), Mix);
        assert_eq!(Reverse.combine(Mix), Mix);
        for mode in [Forward, Reverse, Mix, Constant] {
            assert_eq!(Constant.combine(mode), mode);
            assert_eq!(mode.combine(Constant), mode);
        }
    }

    #[test]
    fn test_eagerness() {
        assert!(Mode::Forward.is_eager());
        assert!(Mode::Constant.is_eager());
        assert!(!Mode::Reverse.is_eager());
        assert!(!Mode::Mix.is_eager());
    }
}
