//! Test mock for `exec::combined_output_logged`: a thread-local handler
//! intercepts commands during unit tests so no external program runs.

use std::cell::RefCell;

pub struct MockResponse {
    pub exit_code: i32,
    pub output: String,
}

impl MockResponse {
    pub fn ok(output: &str) -> Self {
        Self {
            exit_code: 0,
            output: output.to_string(),
        }
    }

    pub fn fail(output: &str) -> Self {
        Self {
            exit_code: 1,
            output: output.to_string(),
        }
    }
}

type MockHandler = Box<dyn Fn(&str, &[&str]) -> MockResponse>;

thread_local! {
    static HANDLER: RefCell<Option<MockHandler>> = const { RefCell::new(None) };
}

/// Guard that clears the mock handler on drop.
pub struct MockGuard;

impl Drop for MockGuard {
    fn drop(&mut self) {
        HANDLER.with(|h| *h.borrow_mut() = None);
    }
}

pub fn install<F>(handler: F) -> MockGuard
where
    F: Fn(&str, &[&str]) -> MockResponse + 'static,
{
    HANDLER.with(|h| *h.borrow_mut() = Some(Box::new(handler)));
    MockGuard
}

pub(crate) fn intercept(program: &str, args: &[&str]) -> Option<MockResponse> {
    HANDLER.with(|h| h.borrow().as_ref().map(|f| f(program, args)))
}
