/// Remembers the last value it was given and reports whether a new one differs.
#[derive(Debug, Default)]
pub struct ChangeObserver<T> {
    last: Option<T>,
}

impl<T: PartialEq> ChangeObserver<T> {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Returns true when `value` differs from the previous one (or is the first).
    pub fn update(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }
}
