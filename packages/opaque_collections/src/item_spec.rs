use std::alloc::Layout;

use crate::{Error, Result, Teardown};

/// The builder-side description of one stored region (an array or list item, or the key or
/// value of a hash table entry): its layout and how to tear it down.
///
/// Setting the layout via [`set_layout_of()`](Self::set_layout_of) also infers a drop-based
/// teardown for the type; an explicitly set teardown always wins over the inferred one.
#[derive(Debug, Default)]
pub(crate) struct ItemSpec {
    layout: Option<Layout>,
    inferred_teardown: Teardown,
    explicit_teardown: Option<Teardown>,
}

impl ItemSpec {
    pub(crate) fn set_layout(&mut self, layout: Layout) {
        self.layout = Some(layout);
        self.inferred_teardown = Teardown::none();
    }

    pub(crate) fn set_layout_of<T>(&mut self) {
        self.layout = Some(Layout::new::<T>());
        self.inferred_teardown = Teardown::drop_in_place::<T>();
    }

    pub(crate) fn set_teardown(&mut self, teardown: Teardown) {
        self.explicit_teardown = Some(teardown);
    }

    #[cfg(test)]
    pub(crate) fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// Validates the spec and returns the final layout and teardown.
    ///
    /// `role` names the region in error messages (e.g. "item", "key").
    pub(crate) fn resolve(&self, role: &str) -> Result<(Layout, Teardown)> {
        let Some(layout) = self.layout else {
            return Err(Error::InvalidConfiguration {
                problem: format!("{role} layout must be set before building"),
            });
        };

        if layout.size() == 0 {
            return Err(Error::InvalidConfiguration {
                problem: format!("{role} layout must have a non-zero size"),
            });
        }

        Ok((
            layout,
            self.explicit_teardown.unwrap_or(self.inferred_teardown),
        ))
    }
}
