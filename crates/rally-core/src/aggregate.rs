use std::fmt;

/// Ordered collection of failures from a batch that keeps going after each one.
///
/// An empty list means the batch succeeded; [`ErrorList::into_result`] turns
/// that into a plain `Result` for callers that only care about the verdict.
#[derive(Debug)]
pub struct ErrorList<E> {
    errors: Vec<E>,
}

impl<E> ErrorList<E> {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.has_failures() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl<E> Default for ErrorList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Extend<E> for ErrorList<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl<E> IntoIterator for ErrorList<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<E: fmt::Display> fmt::Display for ErrorList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "1 error: {}", self.errors[0]),
            n => {
                write!(f, "{} errors:", n)?;
                for err in &self.errors {
                    write!(f, "\n  - {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl<E: std::error::Error> std::error::Error for ErrorList<E> {}
