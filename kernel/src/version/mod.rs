// Box Version Ordering
//
// Parses semantic-version strings, orders them, and evaluates
// comparator queries such as `<1`, `>=1.2.3` or `>=1.0, <2.0`.
// This module is pure and side-effect free.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of numeric components in a full version core.
const CORE_LEN: usize = 3;

/// Errors produced while parsing versions or comparator queries.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version `{input}`: `{component}` is not a non-negative integer")]
    InvalidComponent { input: String, component: String },

    #[error("invalid version `{input}`: expected at most three numeric components")]
    TooManyComponents { input: String },

    #[error("invalid version `{input}`: empty pre-release suffix")]
    EmptyPrerelease { input: String },

    #[error("invalid comparator `{0}`")]
    InvalidComparator(String),
}

/// A parsed box version: `major.minor.patch` plus an optional
/// pre-release suffix (`1.0.0-PRE`).
///
/// Missing trailing components are treated as zero when ordering, but
/// the number of components actually written is remembered so that a
/// comparator operand like `1` can match on the major component only.
#[derive(Debug, Clone)]
pub struct BoxVersion {
    core: [u64; CORE_LEN],
    precision: usize,
    prerelease: Option<String>,
}

impl BoxVersion {
    /// True when fewer than three components were written and there is
    /// no pre-release suffix.
    pub fn is_partial(&self) -> bool {
        self.precision < CORE_LEN && self.prerelease.is_none()
    }

    /// Compare only the first `precision` numeric components.
    fn cmp_prefix(&self, other: &Self, precision: usize) -> Ordering {
        self.core[..precision].cmp(&other.core[..precision])
    }
}

impl FromStr for BoxVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionError::Empty);
        }

        let (numeric, prerelease) = match input.split_once('-') {
            Some((_, "")) => {
                return Err(VersionError::EmptyPrerelease {
                    input: input.to_string(),
                })
            }
            Some((numeric, pre)) => (numeric, Some(pre.to_string())),
            None => (input, None),
        };

        let mut core = [0u64; CORE_LEN];
        let mut precision = 0;
        for component in numeric.split('.') {
            if precision == CORE_LEN {
                return Err(VersionError::TooManyComponents {
                    input: input.to_string(),
                });
            }

            let invalid = || VersionError::InvalidComponent {
                input: input.to_string(),
                component: component.to_string(),
            };
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            core[precision] = component.parse().map_err(|_| invalid())?;
            precision += 1;
        }

        Ok(Self {
            core,
            precision,
            prerelease,
        })
    }
}

impl Ord for BoxVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core.cmp(&other.core).then_with(|| {
            match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // A pre-release sorts before its release.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            }
        })
    }
}

impl PartialOrd for BoxVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for BoxVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BoxVersion {}

impl fmt::Display for BoxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let written = self.precision.max(1);
        for (idx, component) in self.core[..written].iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Comparison operator of a single comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Exact,
}

impl Operator {
    fn admits(self, ordering: Ordering) -> bool {
        match self {
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::Exact => ordering == Ordering::Equal,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Exact => "=",
        };
        f.write_str(symbol)
    }
}

/// One `<op><version>` term. A bare version means exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub operator: Operator,
    pub operand: BoxVersion,
}

impl Comparator {
    /// Whether `candidate` satisfies this comparator.
    ///
    /// A partial operand (`<1`, `>=1.2`) only looks at the components it
    /// names, so `1.0.0-PRE` is not `<1`.
    pub fn matches(&self, candidate: &BoxVersion) -> bool {
        let ordering = if self.operand.is_partial() {
            candidate.cmp_prefix(&self.operand, self.operand.precision)
        } else {
            candidate.cmp(&self.operand)
        };
        self.operator.admits(ordering)
    }
}

impl FromStr for Comparator {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (operator, rest) = [
            (">=", Operator::GreaterOrEqual),
            ("<=", Operator::LessOrEqual),
            (">", Operator::Greater),
            ("<", Operator::Less),
            ("=", Operator::Exact),
        ]
        .iter()
        .find_map(|(symbol, op)| input.strip_prefix(symbol).map(|rest| (*op, rest)))
        .unwrap_or((Operator::Exact, input));

        let rest = rest.trim();
        if rest.is_empty() || rest.starts_with(|c: char| !c.is_ascii_digit()) {
            return Err(VersionError::InvalidComparator(input.to_string()));
        }

        Ok(Self {
            operator,
            operand: rest.parse()?,
        })
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.operand)
    }
}

/// A conjunction of comparators separated by commas.
///
/// The empty query matches every version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionQuery {
    comparators: Vec<Comparator>,
}

impl VersionQuery {
    /// Query that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    pub fn matches(&self, candidate: &BoxVersion) -> bool {
        self.comparators.iter().all(|c| c.matches(candidate))
    }

    /// Parse `candidate` and test it against the query.
    pub fn matches_str(&self, candidate: &str) -> Result<bool, VersionError> {
        if self.is_any() {
            return Ok(true);
        }
        Ok(self.matches(&candidate.parse()?))
    }
}

impl FromStr for VersionQuery {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::any());
        }

        let comparators = s
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<Comparator>, _>>()?;
        Ok(Self { comparators })
    }
}

impl fmt::Display for VersionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, comparator) in self.comparators.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{comparator}")?;
        }
        Ok(())
    }
}

/// Check whether `candidate` satisfies the comparator query `query`.
pub fn satisfies(query: &str, candidate: &str) -> Result<bool, VersionError> {
    query.parse::<VersionQuery>()?.matches_str(candidate)
}
