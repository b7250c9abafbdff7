#![allow(dead_code)]

use std::path::Path;

use cukestream::run::{OutputStream, RecordingHost, RunOutcome, RunSession};
use cukestream::tree::{FeatureNode, RunTarget, TestItemId};

pub const CHECKOUT_PATH: &str = "src/test/resources/features/checkout.feature";

pub const CHECKOUT_FEATURE: &str = "@checkout
Feature: Checkout

  Background:
    Given the store is open

  Scenario: Pay by card
    Given a cart with 2 items
    When the user pays by card
    Then the order is confirmed
    Then the order is confirmed

  @voucher
  Scenario: Pay by voucher
    Given a cart with 2 items
    When the user pays with voucher \"SAVE10\"
    Then the order is confirmed
";

pub const API_PATH: &str = "src/test/resources/features/api.feature";

pub const API_FEATURE: &str = "Feature: Orders API

  Scenario: Create order
    Given [API] the service is up
    When [API] an order is posted
    Then the response status is 201
";

/// Pretty-formatter output for a full checkout run: the second confirmation of
/// "Pay by card" fails, everything else passes.
pub const CHECKOUT_ONE_FAILURE: &str = "\
[INFO] Scanning for projects...
[INFO] -------------------------------------------------------
[INFO]  T E S T S
@checkout
Scenario: Pay by card                  # src/test/resources/features/checkout.feature:7
  \x1b[32m✔ Given the store is open\x1b[0m           # steps.StoreSteps.open()
  \x1b[32m✔ Given a cart with 2 items\x1b[0m         # steps.CartSteps.cart(int)
2024-05-01 10:15:02 INFO  PaymentService - charging card
  \x1b[32m✔ When the user pays by card\x1b[0m        # steps.PaySteps.card()
  \x1b[32m✔ Then the order is confirmed\x1b[0m       # steps.OrderSteps.confirmed()
  \x1b[31m✘ Then the order is confirmed\x1b[0m       # steps.OrderSteps.confirmed()
      java.lang.AssertionError: expected confirmation email
      \tat steps.OrderSteps.confirmed(OrderSteps.java:42)
      \tat ✽.the order is confirmed(file:///src/test/resources/features/checkout.feature:11)

@checkout @voucher
Scenario: Pay by voucher               # src/test/resources/features/checkout.feature:14
  ✔ Given the store is open           # steps.StoreSteps.open()
  ✔ Given a cart with 2 items         # steps.CartSteps.cart(int)
  ✔ When the user pays with voucher \"SAVE10\" # steps.PaySteps.voucher(String)
  ✔ Then the order is confirmed       # steps.OrderSteps.confirmed()

2 Scenarios (1 failed, 1 passed)
9 Steps (1 failed, 8 passed)
0m1.234s
";

/// Same run with every step passing.
pub const CHECKOUT_ALL_PASS: &str = "\
Scenario: Pay by card
  ✔ Given the store is open
  ✔ Given a cart with 2 items
  ✔ When the user pays by card
  ✔ Then the order is confirmed
  ✔ Then the order is confirmed

Scenario: Pay by voucher
  ✔ Given the store is open
  ✔ Given a cart with 2 items
  ✔ When the user pays with voucher \"SAVE10\"
  ✔ Then the order is confirmed

2 Scenarios (2 passed)
9 Steps (9 passed)
";

pub fn id(s: &str) -> TestItemId {
    TestItemId::new(s)
}

/// `CHECKOUT_PATH:<line>`
pub fn checkout(line: u32) -> TestItemId {
    TestItemId::new(format!("{}:{}", CHECKOUT_PATH, line))
}

/// Scratch project with the given feature files written under it.
pub fn project_with(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp project");
    for (path, text) in files {
        write_file(dir.path(), path, text);
    }
    dir
}

pub fn checkout_project() -> tempfile::TempDir {
    project_with(&[(CHECKOUT_PATH, CHECKOUT_FEATURE), (API_PATH, API_FEATURE)])
}

pub fn write_file(root: &Path, path: &str, text: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(full, text).expect("write file");
}

pub fn tree() -> Vec<FeatureNode> {
    let project = checkout_project();
    cukestream::discovery::discover(project.path()).expect("discover features")
}

/// Run captured output through a fresh session, one chunk at a time.
pub fn replay_chunks(
    features: &[FeatureNode],
    target: &str,
    chunks: &[&[u8]],
    exit_code: Option<i32>,
) -> (RecordingHost, RunOutcome) {
    let target = RunTarget::parse(target).expect("valid target");
    let scenarios = target.select(features).expect("target in tree");
    let mut host = RecordingHost::new();
    let mut session = RunSession::new(&mut host, &scenarios, true);
    for chunk in chunks {
        session.feed(OutputStream::Stdout, chunk);
    }
    let outcome = session.finish(exit_code, None);
    (host, outcome)
}

pub fn replay(
    features: &[FeatureNode],
    target: &str,
    output: &str,
    exit_code: Option<i32>,
) -> (RecordingHost, RunOutcome) {
    replay_chunks(features, target, &[output.as_bytes()], exit_code)
}
