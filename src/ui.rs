use colored::{ColoredString, Colorize};
use declarative::{Action, NodeStatus};

/// Symbol for a planned action
pub fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update => "~".yellow(),
        Action::Delete => "-".red(),
        Action::NoOp => "○".dimmed(),
    }
}

/// Symbol for a node's final status
pub fn status_symbol(status: NodeStatus) -> ColoredString {
    match status {
        NodeStatus::Applied => "✓".green(),
        NodeStatus::Failed => "✗".red(),
        NodeStatus::Blocked => "⊘".yellow(),
        NodeStatus::Cancelled => "⊘".dimmed(),
        NodeStatus::Pending | NodeStatus::Planned => "…".dimmed(),
    }
}

pub fn success(msg: &str) {
    println!("{} {}", status_symbol(NodeStatus::Applied), msg);
}

pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Errors go to stderr so `--json` output stays parseable
pub fn error(msg: &str) {
    eprintln!("{} {}", status_symbol(NodeStatus::Failed), msg);
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Title underlined to its own width
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}
