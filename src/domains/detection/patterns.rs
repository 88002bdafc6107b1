use crate::domains::agents::AgentType;

/// Prompts that block on the user, matched case-insensitively.
pub const BASE_WAITING: &[&str] = &[
    r"\[y/n\]",
    r"\(y/n\)",
    r"\byes/no\b",
    r"press enter to continue",
    r"\bdo you want to\b",
    r"\bresume a (previous )?session\b",
    r"select a (session|conversation) to resume",
];

/// Hints agents print only while a turn is in flight.
pub const BASE_BUSY: &[&str] = &[
    r"\besc to interrupt\b",
    r"\bctrl\+c to interrupt\b",
    r"\besc to cancel\b",
];

pub fn waiting_patterns(agent_type: AgentType) -> &'static [&'static str] {
    match agent_type {
        AgentType::ClaudeCode => &[r"❯\s*1\.\s*yes", r"\bwould you like to proceed\b"],
        AgentType::Codex => &[r"\ballow command\??", r"\bapprove this (command|edit)\b"],
        AgentType::Gemini => &[r"\ballow execution\b", r"waiting for user confirmation"],
        AgentType::OpenCode => &[r"\bpermission required\b"],
    }
}

pub fn busy_patterns(agent_type: AgentType) -> &'static [&'static str] {
    match agent_type {
        AgentType::ClaudeCode => &[r"^\s*[✻✽✶✳✢·]\s+\w+…"],
        AgentType::Codex => &[r"\bworking \(\d+s\b"],
        AgentType::Gemini => &[r"^\s*[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]\s"],
        AgentType::OpenCode => &[r"\bworking…"],
    }
}
