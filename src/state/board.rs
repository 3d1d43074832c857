//! Board generation: a fixed-composition deck shuffled into stable grid positions.

use std::collections::HashSet;

use rand::Rng;
use thiserror::Error;

/// Identifier of a card, unique within a board.
pub type CardId = u32;

/// Number of cards on a regular board.
pub const BOARD_SIZE: usize = 36;
/// Number of distinct tokens that appear twice on a regular board.
pub const PAIR_COUNT: usize = 17;

const DEFAULT_PAIR_TOKENS: [&str; PAIR_COUNT] = [
    "us", "gb", "fr", "de", "it", "es", "ca", "au", "jp", "kr", "br", "mx", "in", "cn", "ru",
    "za", "ng",
];
const DEFAULT_SINGLETON_TOKEN: &str = "ch";
const DEFAULT_NEUTRAL_TOKEN: &str = "white";

/// A single card on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Stable identifier, unique within the board.
    pub id: CardId,
    /// Category tag that must be equal for two cards to form a pair.
    pub token: String,
    /// Whether the card currently shows its face.
    pub revealed: bool,
    /// Whether the card has been claimed as part of a pair.
    pub matched: bool,
    /// Grid slot of the card, fixed for the lifetime of the board.
    pub position: u8,
}

impl Card {
    fn face_down(id: CardId, token: &str) -> Self {
        Self {
            id,
            token: token.to_owned(),
            revealed: false,
            matched: false,
            position: 0,
        }
    }
}

/// Reasons a token catalog cannot be used to build a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog does not declare the expected number of paired tokens.
    #[error("expected {expected} paired tokens, got {got}")]
    PairCount {
        /// Required number of paired tokens.
        expected: usize,
        /// Number of paired tokens provided.
        got: usize,
    },
    /// A token appears more than once across pairs, singleton and neutral.
    #[error("token `{0}` is declared more than once")]
    DuplicateToken(String),
    /// A token is empty or only whitespace.
    #[error("tokens must not be blank")]
    BlankToken,
}

/// Set of tokens a board is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCatalog {
    pairs: Vec<String>,
    singleton: String,
    neutral: String,
}

impl TokenCatalog {
    /// Build a catalog, checking it yields a board of [`BOARD_SIZE`] cards with unique tokens.
    pub fn new(
        pairs: Vec<String>,
        singleton: impl Into<String>,
        neutral: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let singleton = singleton.into();
        let neutral = neutral.into();

        if pairs.len() != PAIR_COUNT {
            return Err(CatalogError::PairCount {
                expected: PAIR_COUNT,
                got: pairs.len(),
            });
        }

        let mut seen = HashSet::new();
        for token in pairs.iter().chain([&singleton, &neutral]) {
            if token.trim().is_empty() {
                return Err(CatalogError::BlankToken);
            }
            if !seen.insert(token.as_str()) {
                return Err(CatalogError::DuplicateToken(token.clone()));
            }
        }

        Ok(Self {
            pairs,
            singleton,
            neutral,
        })
    }

    /// Tokens that appear exactly twice.
    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Token that appears once and can never be matched.
    pub fn singleton(&self) -> &str {
        &self.singleton
    }

    /// Neutral token that appears once and can never be matched.
    pub fn neutral(&self) -> &str {
        &self.neutral
    }
}

impl Default for TokenCatalog {
    /// Country flags: 17 paired countries, Switzerland as the odd one out and a white flag.
    fn default() -> Self {
        Self {
            pairs: DEFAULT_PAIR_TOKENS.iter().map(|t| t.to_string()).collect(),
            singleton: DEFAULT_SINGLETON_TOKEN.to_owned(),
            neutral: DEFAULT_NEUTRAL_TOKEN.to_owned(),
        }
    }
}

/// Ordered set of cards, one per grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cards: Vec<Card>,
    singleton: String,
    neutral: String,
}

impl Board {
    /// Assemble a board from already placed cards; cards are kept in position order.
    pub fn from_parts(
        mut cards: Vec<Card>,
        singleton: impl Into<String>,
        neutral: impl Into<String>,
    ) -> Self {
        cards.sort_by_key(|card| card.position);
        Self {
            cards,
            singleton: singleton.into(),
            neutral: neutral.into(),
        }
    }

    /// Cards in position order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Look up a card by identifier.
    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == id)
    }

    pub(crate) fn card_mut(&mut self, id: CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|card| card.id == id)
    }

    /// Token of the single unmatched country.
    pub fn singleton(&self) -> &str {
        &self.singleton
    }

    /// Token of the neutral card.
    pub fn neutral(&self) -> &str {
        &self.neutral
    }

    /// Whether cards carrying `token` are dead positions that never pair up.
    pub fn is_inert(&self, token: &str) -> bool {
        token == self.singleton || token == self.neutral
    }

    /// Number of cards already claimed in pairs.
    pub fn matched_count(&self) -> usize {
        self.cards.iter().filter(|card| card.matched).count()
    }
}

/// Generate a freshly shuffled board using the thread-local RNG.
pub fn generate(catalog: &TokenCatalog) -> Board {
    generate_with(catalog, &mut rand::rng())
}

/// Generate a board from `catalog`, drawing the permutation from `rng`.
pub fn generate_with<R: Rng>(catalog: &TokenCatalog, rng: &mut R) -> Board {
    let mut cards = Vec::with_capacity(catalog.pairs.len() * 2 + 2);
    let mut next_id: CardId = 0;
    let mut push = |token: &str| {
        cards.push(Card::face_down(next_id, token));
        next_id += 1;
    };

    for token in &catalog.pairs {
        push(token);
        push(token);
    }
    push(&catalog.singleton);
    push(&catalog.neutral);

    shuffle(&mut cards, rng);
    for (index, card) in cards.iter_mut().enumerate() {
        card.position = index as u8;
    }

    Board::from_parts(cards, catalog.singleton.clone(), catalog.neutral.clone())
}

/// Fisher-Yates: walk from the last slot down, swapping with a uniform pick in `[0, i]`.
fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn token_counts(board: &Board) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for card in board.cards() {
            *counts.entry(card.token.as_str()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn default_catalog_is_valid() {
        let catalog = TokenCatalog::default();
        let rebuilt = TokenCatalog::new(
            catalog.pairs().to_vec(),
            catalog.singleton(),
            catalog.neutral(),
        )
        .unwrap();
        assert_eq!(rebuilt, catalog);
    }

    #[test]
    fn catalog_rejects_wrong_pair_count() {
        let err = TokenCatalog::new(vec!["us".into()], "ch", "white").unwrap_err();
        assert_eq!(
            err,
            CatalogError::PairCount {
                expected: PAIR_COUNT,
                got: 1
            }
        );
    }

    #[test]
    fn catalog_rejects_singleton_reused_as_pair() {
        let catalog = TokenCatalog::default();
        let err = TokenCatalog::new(catalog.pairs().to_vec(), "us", "white").unwrap_err();
        assert_eq!(err, CatalogError::DuplicateToken("us".into()));
    }

    #[test]
    fn catalog_rejects_blank_tokens() {
        let catalog = TokenCatalog::default();
        let err = TokenCatalog::new(catalog.pairs().to_vec(), "ch", "  ").unwrap_err();
        assert_eq!(err, CatalogError::BlankToken);
    }

    #[test]
    fn cards_start_face_down() {
        let board = generate(&TokenCatalog::default());
        assert!(board.cards().iter().all(|c| !c.revealed && !c.matched));
        assert_eq!(board.matched_count(), 0);
    }

    #[test]
    fn singleton_and_neutral_are_inert() {
        let board = generate(&TokenCatalog::default());
        assert!(board.is_inert("ch"));
        assert!(board.is_inert("white"));
        assert!(!board.is_inert("fr"));
    }

    #[test]
    fn same_seed_gives_same_layout() {
        let catalog = TokenCatalog::default();
        let first = generate_with(&catalog, &mut StdRng::seed_from_u64(7));
        let second = generate_with(&catalog, &mut StdRng::seed_from_u64(7));
        assert_eq!(first, second);
    }

    #[test]
    fn shuffle_keeps_every_element() {
        let mut items: Vec<u32> = (0..36).collect();
        shuffle(&mut items, &mut StdRng::seed_from_u64(99));
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..36).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn generated_boards_respect_composition(seed in any::<u64>()) {
            let board = generate_with(&TokenCatalog::default(), &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(board.cards().len(), BOARD_SIZE);

            let counts = token_counts(&board);
            prop_assert_eq!(counts.values().filter(|n| **n == 2).count(), PAIR_COUNT);
            prop_assert_eq!(counts.get("ch").copied(), Some(1));
            prop_assert_eq!(counts.get("white").copied(), Some(1));

            let positions: HashSet<u8> = board.cards().iter().map(|c| c.position).collect();
            prop_assert_eq!(positions.len(), BOARD_SIZE);
            prop_assert!(positions.iter().all(|p| (*p as usize) < BOARD_SIZE));

            let ids: HashSet<CardId> = board.cards().iter().map(|c| c.id).collect();
            prop_assert_eq!(ids.len(), BOARD_SIZE);
        }
    }
}
