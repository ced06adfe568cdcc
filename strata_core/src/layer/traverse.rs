// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::node::Layer;

/// A pre-order iterator over a layer and its descendants.
///
/// Created by [`Layer::descendants`].
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a Layer>,
}

impl<'a> Descendants<'a> {
    pub(crate) fn new(root: &'a Layer) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<&'a Layer> {
        let layer = self.stack.pop()?;
        self.stack.extend(layer.children().iter().rev());
        Some(layer)
    }
}
