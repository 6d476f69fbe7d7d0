//! Register identifiers, register sets and per-register use counts.
//!
//! The baseline compiler never assigns registers ahead of time. A register is
//! "in use" exactly while at least one live value slot references it, so the
//! register file only has to count references and pick spill victims when a
//! class runs dry. Victims are chosen round-robin with a per-bank clock.

/// Maximum number of register banks supported (GP, FP).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 16;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Bank holding general purpose registers.
pub const GP_BANK: RegBank = 0;

/// Bank holding floating-point / vector registers.
pub const FP_BANK: RegBank = 1;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const fn gp(id: RegId) -> Self {
        Self::new(GP_BANK, id)
    }

    pub const fn fp(id: RegId) -> Self {
        Self::new(FP_BANK, id)
    }

    pub fn class(&self) -> RegClass {
        if self.bank == FP_BANK {
            RegClass::Fp
        } else {
            RegClass::Gp
        }
    }

    /// Get the linear register index for array indexing.
    pub fn linear_index(&self) -> usize {
        (self.bank as usize) * MAX_REGISTERS_PER_BANK + (self.id as usize)
    }
}

impl std::fmt::Display for AsmReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.class() {
            RegClass::Gp => write!(f, "gp{}", self.id),
            RegClass::Fp => write!(f, "fp{}", self.id),
        }
    }
}

/// Register class a value needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gp,
    Fp,
}

impl RegClass {
    pub fn bank(self) -> RegBank {
        match self {
            RegClass::Gp => GP_BANK,
            RegClass::Fp => FP_BANK,
        }
    }
}

/// Register set with one 64-bit mask per bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    pub const fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    pub fn from_regs(regs: &[AsmReg]) -> Self {
        regs.iter().fold(Self::new(), |set, &reg| set.with(reg))
    }

    /// Bank index and mask bit of `reg`, or `None` if it cannot be represented.
    fn bit(reg: AsmReg) -> Option<(usize, u64)> {
        let bank = reg.bank as usize;
        (bank < MAX_REGISTER_BANKS && reg.id < 64).then(|| (bank, 1u64 << reg.id))
    }

    pub fn contains(&self, reg: AsmReg) -> bool {
        Self::bit(reg).is_some_and(|(bank, bit)| self.banks[bank] & bit != 0)
    }

    pub fn set(&mut self, reg: AsmReg) {
        if let Some((bank, bit)) = Self::bit(reg) {
            self.banks[bank] |= bit;
        }
    }

    pub fn clear(&mut self, reg: AsmReg) {
        if let Some((bank, bit)) = Self::bit(reg) {
            self.banks[bank] &= !bit;
        }
    }

    /// Copy of this set with `reg` added.
    pub fn with(mut self, reg: AsmReg) -> Self {
        self.set(reg);
        self
    }

    pub fn union(&mut self, other: &RegBitSet) {
        for (mask, other) in self.banks.iter_mut().zip(other.banks) {
            *mask |= other;
        }
    }

    /// Find first register of `class` in this set that is not in `exclude`.
    pub fn first_excluding(&self, class: RegClass, exclude: &RegBitSet) -> Option<AsmReg> {
        let bank = class.bank();
        let free = self.banks[bank as usize] & !exclude.banks[bank as usize];
        (free != 0).then(|| AsmReg::new(bank, free.trailing_zeros() as RegId))
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|&bank| bank == 0)
    }

    /// Iterate over all registers in the set, bank by bank, lowest id first.
    pub fn iter(&self) -> impl Iterator<Item = AsmReg> + '_ {
        (0..MAX_REGISTER_BANKS).flat_map(move |bank| {
            let mask = self.banks[bank];
            (0..64u8)
                .filter(move |id| mask & (1u64 << id) != 0)
                .map(move |id| AsmReg::new(bank as RegBank, id))
        })
    }
}

/// Use counts over the registers the compiler may cache values in.
///
/// `used` mirrors `use_counts`: a register is in the set iff its count is
/// non-zero. Only registers in `cache_regs` are ever counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    /// Registers values may be cached in.
    cache_regs: RegBitSet,
    /// Registers with a non-zero use count.
    used: RegBitSet,
    /// Number of live slots referencing each register.
    use_counts: [u32; MAX_REGISTER_BANKS * MAX_REGISTERS_PER_BANK],
    /// Clock position for spill victim selection in each bank.
    clocks: [RegId; MAX_REGISTER_BANKS],
}

impl RegisterFile {
    pub fn new(cache_regs: RegBitSet) -> Self {
        Self {
            cache_regs,
            used: RegBitSet::new(),
            use_counts: [0; MAX_REGISTER_BANKS * MAX_REGISTERS_PER_BANK],
            clocks: [0; MAX_REGISTER_BANKS],
        }
    }

    pub fn cache_regs(&self) -> RegBitSet {
        self.cache_regs
    }

    pub fn used(&self) -> RegBitSet {
        self.used
    }

    pub fn inc_used(&mut self, reg: AsmReg) {
        debug_assert!(self.cache_regs.contains(reg), "{reg} is not a cache register");
        self.used.set(reg);
        self.use_counts[reg.linear_index()] += 1;
    }

    pub fn dec_used(&mut self, reg: AsmReg) {
        let count = &mut self.use_counts[reg.linear_index()];
        debug_assert!(*count > 0, "use count underflow on {reg}");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.used.clear(reg);
        }
    }

    pub fn use_count(&self, reg: AsmReg) -> u32 {
        self.use_counts[reg.linear_index()]
    }

    pub fn is_used(&self, reg: AsmReg) -> bool {
        self.used.contains(reg)
    }

    /// Referenced by exactly one slot.
    pub fn is_free_to_overwrite(&self, reg: AsmReg) -> bool {
        self.use_count(reg) == 1
    }

    /// First cache register of `class` that is neither used nor pinned.
    pub fn unused_register(&self, class: RegClass, pinned: &RegBitSet) -> Option<AsmReg> {
        let mut exclude = self.used;
        exclude.union(pinned);
        self.cache_regs.first_excluding(class, &exclude)
    }

    /// Pick the next used, unpinned register of `class` as spill victim.
    pub fn next_spill_candidate(&mut self, class: RegClass, pinned: &RegBitSet) -> Option<AsmReg> {
        let bank = class.bank() as usize;
        for _ in 0..MAX_REGISTERS_PER_BANK {
            let reg = AsmReg::new(bank as RegBank, self.clocks[bank]);
            self.clocks[bank] = (self.clocks[bank] + 1) % (MAX_REGISTERS_PER_BANK as RegId);
            if self.cache_regs.contains(reg) && self.used.contains(reg) && !pinned.contains(reg) {
                return Some(reg);
            }
        }
        None
    }

    /// Forget all uses, keeping the cache register set.
    pub fn reset(&mut self) {
        self.used = RegBitSet::new();
        self.use_counts.fill(0);
        self.clocks.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_regfile() -> RegisterFile {
        let mut cache_regs = RegBitSet::new();
        for id in 0..4 {
            cache_regs.set(AsmReg::gp(id));
            cache_regs.set(AsmReg::fp(id));
        }
        RegisterFile::new(cache_regs)
    }

    #[test]
    fn test_regbitset_operations() {
        let mut set = RegBitSet::new();
        let reg = AsmReg::gp(5);

        assert!(!set.contains(reg));
        set.set(reg);
        assert!(set.contains(reg));
        set.clear(reg);
        assert!(!set.contains(reg));
        assert!(set.is_empty());
    }

    #[test]
    fn test_iter_is_ordered_by_bank() {
        let set = RegBitSet::from_regs(&[AsmReg::fp(1), AsmReg::gp(9), AsmReg::gp(2)]);
        let regs: Vec<_> = set.iter().collect();
        assert_eq!(regs, vec![AsmReg::gp(2), AsmReg::gp(9), AsmReg::fp(1)]);
    }

    #[test]
    fn test_use_counts_track_used_set() {
        let mut regfile = create_test_regfile();
        let reg = AsmReg::gp(1);

        regfile.inc_used(reg);
        regfile.inc_used(reg);
        assert_eq!(regfile.use_count(reg), 2);
        assert!(regfile.is_used(reg));

        regfile.dec_used(reg);
        assert!(regfile.is_used(reg));
        assert!(regfile.is_free_to_overwrite(reg));

        regfile.dec_used(reg);
        assert!(!regfile.is_used(reg));
        assert_eq!(regfile.used(), RegBitSet::new());
    }

    #[test]
    fn test_unused_register_respects_pinned() {
        let mut regfile = create_test_regfile();
        regfile.inc_used(AsmReg::gp(0));
        let pinned = RegBitSet::from_regs(&[AsmReg::gp(1)]);

        assert_eq!(
            regfile.unused_register(RegClass::Gp, &pinned),
            Some(AsmReg::gp(2))
        );
        assert_eq!(
            regfile.unused_register(RegClass::Fp, &pinned),
            Some(AsmReg::fp(0))
        );
    }

    #[test]
    fn test_spill_candidates_rotate() {
        let mut regfile = create_test_regfile();
        for id in 0..4 {
            regfile.inc_used(AsmReg::gp(id));
        }
        assert_eq!(regfile.unused_register(RegClass::Gp, &RegBitSet::new()), None);

        let pinned = RegBitSet::from_regs(&[AsmReg::gp(0)]);
        let first = regfile.next_spill_candidate(RegClass::Gp, &pinned).unwrap();
        let second = regfile.next_spill_candidate(RegClass::Gp, &pinned).unwrap();
        assert_eq!(first, AsmReg::gp(1));
        assert_eq!(second, AsmReg::gp(2));
    }

    #[test]
    fn test_no_candidate_when_everything_pinned() {
        let mut regfile = create_test_regfile();
        regfile.inc_used(AsmReg::fp(3));
        let pinned = RegBitSet::from_regs(&[AsmReg::fp(3)]);
        assert_eq!(regfile.next_spill_candidate(RegClass::Fp, &pinned), None);
    }
}
