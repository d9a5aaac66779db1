//! Glue (§4.7): sequences a fixed list of sub-expressions — typically a
//! chain of assignments building up to a final result — so they forward
//! in construction order and backward in the reverse order. Only the
//! last stage's value is the glue's own value; every earlier stage is
//! evaluated purely for its mutating side effect (an assign or
//! compound-assign into some leaf read later in the chain).
//!
//! Implemented for tuples of arity 2 through 6 rather than a `Vec<Box<dyn
//! Node>>`: the canonical path stays monomorphized, and a handful of
//! fixed arities covers every glue chain the node algebra actually needs
//! (a `Vec`-backed variant would force heap-boxing every stage).

use crate::error::AdError;
use crate::node::{Cursor, Node};
use crate::shape::Shape;
use crate::storage::StorageView;

macro_rules! glue_tuple {
    ($($t:ident : $idx:tt),+ ; $last:ident : $last_idx:tt ; rev: $($ridx:tt),+) => {
        impl<$($t: Node,)+ $last: Node> Node for ($($t,)+ $last,) {
            fn shape(&self) -> Shape {
                self.$last_idx.shape()
            }

            fn value_buffer_size(&self) -> usize {
                0 $(+ self.$idx.value_buffer_size())+ + self.$last_idx.value_buffer_size()
            }

            fn adjoint_buffer_size(&self) -> usize {
                0 $(+ self.$idx.adjoint_buffer_size())+ + self.$last_idx.adjoint_buffer_size()
            }

            fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
                $(self.$idx.bind(cursor)?;)+
                self.$last_idx.bind(cursor)
            }

            fn feval(&mut self, values: &mut [f64]) {
                $(self.$idx.feval(values);)+
                self.$last_idx.feval(values);
            }

            fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
                self.$last_idx.value(values)
            }

            fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
                self.$last_idx.beval(values, seed);
                $(
                    let shape = self.$ridx.shape();
                    let zero = vec![0.0; shape.len()];
                    self.$ridx.beval(values, StorageView::new(shape, &zero));
                )+
            }

            fn reset_adjoints(&mut self) {
                $(self.$idx.reset_adjoints();)+
                self.$last_idx.reset_adjoints();
            }

            fn deep_clone(&self) -> Self {
                ($(self.$idx.deep_clone(),)+ self.$last_idx.deep_clone(),)
            }
        }
    };
}

// `$idx` lists construction order (what `bind`/`feval`/`reset_adjoints`/
// `deep_clone` need); `rev:` lists the same fields back to front (what
// `beval` needs, since adjoints must flow out of a later stage before an
// earlier stage's assign forwards them on). The last field always runs
// first in `beval` regardless, since it's the glue's own output.
glue_tuple!(A0: 0 ; A1: 1 ; rev: 0);
glue_tuple!(B0: 0, B1: 1 ; A2: 2 ; rev: 1, 0);
glue_tuple!(C0: 0, C1: 1, C2: 2 ; A3: 3 ; rev: 2, 1, 0);
glue_tuple!(D0: 0, D1: 1, D2: 2, D3: 3 ; A4: 4 ; rev: 3, 2, 1, 0);
glue_tuple!(E0: 0, E1: 1, E2: 2, E3: 3, E4: 4 ; A5: 5 ; rev: 4, 3, 2, 1, 0);
