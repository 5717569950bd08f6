use crate::bind::{BindMap, placeholder_name};
use crate::error::OrmResult;
use crate::ident::Quoter;
use crate::raw::Raw;
use crate::value::Value;

/// State threaded through one statement build.
///
/// Every recursive compiler receives the same context, so placeholder names
/// drawn from it never collide, even across nested groups and raw fragments.
#[derive(Debug)]
pub struct CompileContext<'q> {
    quoter: &'q Quoter,
    binds: BindMap,
    next: u64,
}

impl<'q> CompileContext<'q> {
    /// Start a build whose first placeholder uses counter value `start`.
    pub fn new(quoter: &'q Quoter, start: u64) -> Self {
        Self {
            quoter,
            binds: BindMap::new(),
            next: start,
        }
    }

    pub fn quoter(&self) -> &'q Quoter {
        self.quoter
    }

    /// Allocate a fresh placeholder name.
    pub fn placeholder(&mut self) -> String {
        let name = placeholder_name(self.next);
        self.next += 1;
        name
    }

    /// Type-map `value`, register it under a fresh placeholder and return the name.
    pub fn push_value(&mut self, value: Value) -> String {
        let name = self.placeholder();
        self.binds.insert(name.clone(), value.bind());
        name
    }

    /// Expand a raw fragment, merging its parameters into this build.
    pub fn expand_raw(&mut self, raw: &Raw) -> OrmResult<String> {
        raw.expand(self.quoter, &mut self.binds)
    }

    pub fn quote_table(&self, table: &str) -> OrmResult<String> {
        self.quoter.quote_table(table)
    }

    pub fn quote_column(&self, column: &str) -> OrmResult<String> {
        self.quoter.quote_column(column)
    }

    pub fn binds(&self) -> &BindMap {
        &self.binds
    }

    /// Finish the build, returning the bind map and the next counter value.
    pub fn finish(self) -> (BindMap, u64) {
        (self.binds, self.next)
    }
}
