//! Fixed action enumeration - maps network output indices to game command symbols

use crate::error::{Result, TrainError};

/// Command symbols understood by the StrikeForce client, in network output order
///
/// `w`/`a`/`s`/`d` move, `1` turns left, `p` punches, `x` fires the selected
/// weapon, `[` places a block, `]` places a portal, `+` does nothing.
pub const STRIKEFORCE_SYMBOLS: [char; 11] = ['`', '1', 'p', 'x', 'a', 'w', 's', 'd', '[', ']', '+'];

/// Ordered, fixed set of discrete actions
///
/// The index <-> symbol mapping never changes after construction, so indices
/// stored in trajectories and replay memory stay meaningful for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    symbols: Vec<char>,
}

impl ActionSet {
    /// Create an action set from an ordered list of unique symbols
    pub fn new(symbols: Vec<char>) -> Result<Self> {
        if symbols.is_empty() {
            return Err(TrainError::invalid_input("action set must not be empty"));
        }
        for (i, symbol) in symbols.iter().enumerate() {
            if symbols[..i].contains(symbol) {
                return Err(TrainError::invalid_input(format!(
                    "duplicate action symbol {:?}",
                    symbol
                )));
            }
        }
        Ok(Self { symbols })
    }

    /// The 11-command set used by the StrikeForce bots
    pub fn strikeforce() -> Self {
        Self {
            symbols: STRIKEFORCE_SYMBOLS.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Check that an action index is inside `[0, len)`
    pub fn validate(&self, index: usize) -> Result<usize> {
        if index < self.symbols.len() {
            Ok(index)
        } else {
            Err(TrainError::invalid_input(format!(
                "action index {} outside [0, {})",
                index,
                self.symbols.len()
            )))
        }
    }

    /// Symbol for an action index
    pub fn symbol(&self, index: usize) -> Result<char> {
        self.validate(index).map(|i| self.symbols[i])
    }

    /// Action index for a symbol
    pub fn index_of(&self, symbol: char) -> Result<usize> {
        self.symbols
            .iter()
            .position(|&s| s == symbol)
            .ok_or_else(|| TrainError::invalid_input(format!("unknown action symbol {:?}", symbol)))
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        Self::strikeforce()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strikeforce_set_has_eleven_actions() {
        let actions = ActionSet::strikeforce();
        assert_eq!(actions.len(), 11);
        assert_eq!(actions.symbol(0).unwrap(), '`');
        assert_eq!(actions.symbol(10).unwrap(), '+');
    }

    #[test]
    fn test_index_symbol_round_trip() {
        let actions = ActionSet::strikeforce();
        for (i, &symbol) in STRIKEFORCE_SYMBOLS.iter().enumerate() {
            assert_eq!(actions.index_of(symbol).unwrap(), i);
        }
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let actions = ActionSet::strikeforce();
        assert!(matches!(
            actions.validate(11),
            Err(TrainError::InvalidInput(_))
        ));
        assert!(actions.index_of('q').is_err());
    }

    #[test]
    fn test_duplicate_symbols_are_rejected() {
        assert!(ActionSet::new(vec!['w', 'w']).is_err());
        assert!(ActionSet::new(Vec::new()).is_err());
    }
}
