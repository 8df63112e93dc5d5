//! Binary operators and their static precedence table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators understood by the lowering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// One row of the operator table
#[derive(Debug)]
pub struct OperatorInfo {
    pub op: BinaryOperator,
    pub symbol: &'static str,
    /// Higher binds tighter
    pub precedence: u8,
    pub associativity: Associativity,
}

const fn row(op: BinaryOperator, symbol: &'static str, precedence: u8) -> OperatorInfo {
    OperatorInfo {
        op,
        symbol,
        precedence,
        associativity: Associativity::Left,
    }
}

/// Indexed by `BinaryOperator as usize`
pub static OPERATORS: &[OperatorInfo] = &[
    row(BinaryOperator::Add, "+", 9),
    row(BinaryOperator::Sub, "-", 9),
    row(BinaryOperator::Mul, "*", 10),
    row(BinaryOperator::Div, "/", 10),
    row(BinaryOperator::Rem, "%", 10),
    row(BinaryOperator::BitAnd, "&", 5),
    row(BinaryOperator::BitOr, "|", 3),
    row(BinaryOperator::BitXor, "^", 4),
    row(BinaryOperator::Shl, "<<", 8),
    row(BinaryOperator::Shr, ">>", 8),
    row(BinaryOperator::Eq, "==", 6),
    row(BinaryOperator::Ne, "!=", 6),
    row(BinaryOperator::Lt, "<", 7),
    row(BinaryOperator::Le, "<=", 7),
    row(BinaryOperator::Gt, ">", 7),
    row(BinaryOperator::Ge, ">=", 7),
];

impl BinaryOperator {
    pub fn info(self) -> &'static OperatorInfo {
        &OPERATORS[self as usize]
    }

    pub fn symbol(self) -> &'static str {
        self.info().symbol
    }

    pub fn precedence(self) -> u8 {
        self.info().precedence
    }

    pub fn associativity(self) -> Associativity {
        self.info().associativity
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        OPERATORS.iter().find(|row| row.symbol == symbol).map(|row| row.op)
    }

    /// Comparisons produce a boolean regardless of operand type
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operator `{0}`")]
pub struct UnknownOperator(pub String);

impl TryFrom<String> for BinaryOperator {
    type Error = UnknownOperator;

    fn try_from(symbol: String) -> Result<Self, Self::Error> {
        Self::from_symbol(&symbol).ok_or(UnknownOperator(symbol))
    }
}

impl From<BinaryOperator> for String {
    fn from(op: BinaryOperator) -> Self {
        op.symbol().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_discriminant() {
        for (index, row) in OPERATORS.iter().enumerate() {
            assert_eq!(row.op as usize, index, "row for `{}` is out of place", row.symbol);
        }
    }

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(BinaryOperator::from_symbol("<<"), Some(BinaryOperator::Shl));
        assert_eq!(BinaryOperator::from_symbol("**"), None);
        assert!(BinaryOperator::Mul.precedence() > BinaryOperator::Add.precedence());
        assert!(BinaryOperator::Le.is_comparison());
    }

    #[test]
    fn test_serde_uses_symbols() {
        let op: BinaryOperator = serde_json::from_str("\"%\"").unwrap();
        assert_eq!(op, BinaryOperator::Rem);
        assert_eq!(serde_json::to_string(&BinaryOperator::Ne).unwrap(), "\"!=\"");
        assert!(serde_json::from_str::<BinaryOperator>("\"=>\"").is_err());
    }
}
