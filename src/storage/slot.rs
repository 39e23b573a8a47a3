//! Slot words and the slot array
//!
//! A slot (group) is one 32-byte storage word holding up to eight packed
//! 4-byte selectors. Position `p` occupies bytes `[4p, 4p + 4)`.

use crate::error::{Error, Result};
use crate::types::{parse_hex, write_hex, Selector, SELECTOR_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of selectors packed into one slot word
pub const SLOT_CAPACITY: usize = 8;

/// Width of a slot word in bytes
pub const WORD_LEN: usize = SLOT_CAPACITY * SELECTOR_LEN;

/// One packed group of up to eight selectors
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotWord([u8; WORD_LEN]);

impl SlotWord {
    /// A word with every cell cleared
    pub const EMPTY: SlotWord = SlotWord([0u8; WORD_LEN]);

    /// Pack selectors into consecutive positions starting at 0
    pub fn from_selectors(selectors: &[Selector]) -> Result<Self> {
        if selectors.len() > SLOT_CAPACITY {
            return Err(Error::InvalidArgument(format!(
                "A slot word holds at most {} selectors, got {}",
                SLOT_CAPACITY,
                selectors.len()
            )));
        }
        let mut word = Self::EMPTY;
        for (position, selector) in selectors.iter().enumerate() {
            word.set(position, *selector);
        }
        Ok(word)
    }

    pub fn as_bytes(&self) -> &[u8; WORD_LEN] {
        &self.0
    }

    /// Selector stored at `position`.
    ///
    /// Panics if `position >= SLOT_CAPACITY`.
    pub fn get(&self, position: usize) -> Selector {
        let start = position * SELECTOR_LEN;
        let mut bytes = [0u8; SELECTOR_LEN];
        bytes.copy_from_slice(&self.0[start..start + SELECTOR_LEN]);
        Selector::new(bytes)
    }

    /// Overwrite the cell at `position`.
    ///
    /// Panics if `position >= SLOT_CAPACITY`.
    pub fn set(&mut self, position: usize, selector: Selector) {
        let start = position * SELECTOR_LEN;
        self.0[start..start + SELECTOR_LEN].copy_from_slice(selector.as_bytes());
    }

    pub fn clear(&mut self, position: usize) {
        self.set(position, Selector::default());
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// The first `len` cells
    pub fn selectors(&self, len: usize) -> impl Iterator<Item = Selector> + '_ {
        (0..len.min(SLOT_CAPACITY)).map(move |position| self.get(position))
    }
}

impl fmt::Display for SlotWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for SlotWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotWord({})", self)
    }
}

impl TryFrom<String> for SlotWord {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        parse_hex::<WORD_LEN>(value.trim(), "Slot word").map(Self)
    }
}

impl From<SlotWord> for String {
    fn from(word: SlotWord) -> Self {
        word.to_string()
    }
}

/// Slot array length: full groups plus occupancy of the trailing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotHeader {
    /// Number of fully occupied groups
    pub num_full_slots: u64,
    /// Occupancy (0-7) of the trailing partial group
    pub last_slot_len: u8,
}

impl SlotHeader {
    pub fn new(num_full_slots: u64, last_slot_len: u8) -> Self {
        Self {
            num_full_slots,
            last_slot_len,
        }
    }

    /// Total live selectors
    pub fn selector_count(&self) -> u64 {
        self.num_full_slots * SLOT_CAPACITY as u64 + self.last_slot_len as u64
    }

    /// Number of groups that must exist in the store
    pub fn group_count(&self) -> u64 {
        self.num_full_slots + u64::from(self.last_slot_len > 0)
    }

    /// Occupancy of the group at `index`
    pub fn occupancy(&self, index: u64) -> usize {
        if index < self.num_full_slots {
            SLOT_CAPACITY
        } else if index == self.num_full_slots {
            self.last_slot_len as usize
        } else {
            0
        }
    }
}

impl fmt::Display for SlotHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} full slots + {} in trailing slot",
            self.num_full_slots, self.last_slot_len
        )
    }
}

/// Dumb fixed-capacity word store addressed by contiguous group index
///
/// Only the trailing group may be deleted and groups are only appended at
/// the end. Keeping the header consistent with the groups is the caller's job.
pub trait SlotArray {
    fn length(&self) -> SlotHeader;
    fn set_length(&mut self, header: SlotHeader) -> Result<()>;

    /// Number of groups physically present
    fn group_count(&self) -> u64;

    fn read_group(&self, index: u64) -> Result<SlotWord>;
    fn write_group(&mut self, index: u64, word: SlotWord) -> Result<()>;
    fn delete_group(&mut self, index: u64) -> Result<()>;
    fn append_group(&mut self, word: SlotWord) -> Result<()>;
}

/// Vec-backed slot array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotVec {
    header: SlotHeader,
    groups: Vec<SlotWord>,
}

impl SlotVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[SlotWord] {
        &self.groups
    }

    fn check_index(&self, index: u64) -> Result<usize> {
        if index >= self.groups.len() as u64 {
            return Err(Error::Storage(format!(
                "Slot index {} out of range ({} groups)",
                index,
                self.groups.len()
            )));
        }
        Ok(index as usize)
    }
}

impl SlotArray for SlotVec {
    fn length(&self) -> SlotHeader {
        self.header
    }

    fn set_length(&mut self, header: SlotHeader) -> Result<()> {
        if header.last_slot_len as usize >= SLOT_CAPACITY {
            return Err(Error::Storage(format!(
                "Trailing slot length {} exceeds {}",
                header.last_slot_len,
                SLOT_CAPACITY - 1
            )));
        }
        self.header = header;
        Ok(())
    }

    fn group_count(&self) -> u64 {
        self.groups.len() as u64
    }

    fn read_group(&self, index: u64) -> Result<SlotWord> {
        let index = self.check_index(index)?;
        Ok(self.groups[index])
    }

    fn write_group(&mut self, index: u64, word: SlotWord) -> Result<()> {
        let index = self.check_index(index)?;
        self.groups[index] = word;
        Ok(())
    }

    fn delete_group(&mut self, index: u64) -> Result<()> {
        if index + 1 != self.groups.len() as u64 {
            return Err(Error::Storage(format!(
                "Only the trailing group can be deleted (asked for {}, have {})",
                index,
                self.groups.len()
            )));
        }
        self.groups.pop();
        Ok(())
    }

    fn append_group(&mut self, word: SlotWord) -> Result<()> {
        self.groups.push(word);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(n: u32) -> Selector {
        Selector::from(n)
    }

    #[test]
    fn test_word_positions() {
        let mut word = SlotWord::EMPTY;
        word.set(0, sel(0x11111111));
        word.set(7, sel(0x77777777));

        assert_eq!(word.get(0), sel(0x11111111));
        assert_eq!(word.get(7), sel(0x77777777));
        assert!(word.get(3).is_zero());

        // Position 0 is the leading four bytes
        assert_eq!(&word.as_bytes()[0..4], &[0x11, 0x11, 0x11, 0x11]);
        assert_eq!(&word.as_bytes()[28..32], &[0x77, 0x77, 0x77, 0x77]);

        word.clear(0);
        word.clear(7);
        assert!(word.is_empty());
    }

    #[test]
    fn test_word_from_selectors() -> Result<()> {
        let word = SlotWord::from_selectors(&[sel(1), sel(2), sel(3)])?;
        let collected: Vec<_> = word.selectors(3).collect();
        assert_eq!(collected, vec![sel(1), sel(2), sel(3)]);

        let too_many: Vec<_> = (1..=9).map(sel).collect();
        assert!(SlotWord::from_selectors(&too_many).is_err());
        Ok(())
    }

    #[test]
    fn test_word_hex_form() -> Result<()> {
        let word = SlotWord::from_selectors(&[sel(0xdeadbeef)])?;
        let text = String::from(word);
        assert!(text.starts_with("0xdeadbeef"));
        assert_eq!(text.len(), 2 + WORD_LEN * 2);
        assert_eq!(SlotWord::try_from(text)?, word);
        Ok(())
    }

    #[test]
    fn test_header_counts() {
        let header = SlotHeader::new(1, 1);
        assert_eq!(header.selector_count(), 9);
        assert_eq!(header.group_count(), 2);
        assert_eq!(header.occupancy(0), 8);
        assert_eq!(header.occupancy(1), 1);
        assert_eq!(header.occupancy(2), 0);

        let full = SlotHeader::new(2, 0);
        assert_eq!(full.selector_count(), 16);
        assert_eq!(full.group_count(), 2);
        assert_eq!(SlotHeader::default().group_count(), 0);
    }

    #[test]
    fn test_slot_vec_trailing_only_delete() -> Result<()> {
        let mut slots = SlotVec::new();
        slots.append_group(SlotWord::from_selectors(&[sel(1)])?)?;
        slots.append_group(SlotWord::from_selectors(&[sel(2)])?)?;
        assert_eq!(slots.group_count(), 2);

        assert!(slots.delete_group(0).is_err());
        slots.delete_group(1)?;
        assert_eq!(slots.group_count(), 1);
        assert!(slots.read_group(1).is_err());
        assert_eq!(slots.read_group(0)?.get(0), sel(1));
        Ok(())
    }

    #[test]
    fn test_slot_vec_rejects_full_trailing_len() {
        let mut slots = SlotVec::new();
        assert!(slots.set_length(SlotHeader::new(0, 8)).is_err());
        assert!(slots.set_length(SlotHeader::new(3, 7)).is_ok());
        assert_eq!(slots.length(), SlotHeader::new(3, 7));
    }
}
