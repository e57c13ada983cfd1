/// A forward-referenceable jump target. Jump instructions carry the label
/// number until the link pass swaps in the bound offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);

#[derive(Debug, Default)]
pub struct LabelTable {
    offsets: Vec<Option<usize>>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.offsets.len() as u32);
        self.offsets.push(None);
        label
    }

    /// Bind `label` to `offset`. Each label is bound exactly once.
    pub fn set(&mut self, label: Label, offset: usize) {
        let slot = &mut self.offsets[label.0 as usize];
        debug_assert!(slot.is_none(), "label {} bound twice", label.0);
        *slot = Some(offset);
    }

    pub fn offset(&self, label: Label) -> Option<usize> {
        self.offsets.get(label.0 as usize).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_numbered_in_order() {
        let mut labels = LabelTable::new();
        assert_eq!(labels.new_label(), Label(0));
        assert_eq!(labels.new_label(), Label(1));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn unbound_label_has_no_offset() {
        let mut labels = LabelTable::new();
        let l = labels.new_label();
        assert_eq!(labels.offset(l), None);
        labels.set(l, 12);
        assert_eq!(labels.offset(l), Some(12));
        assert_eq!(labels.offset(Label(7)), None);
    }
}
