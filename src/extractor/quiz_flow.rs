// src/extractor/quiz_flow.rs
//
// 测验处理的状态迁移表。平台策略的差异只体现在表中的守卫条件上，
// 提取器本身只负责执行每个状态的动作并上报事件。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizState {
    /// 读取测验概览页
    Discover,
    /// 开始新的作答并立即提交
    EnterAttempt,
    /// 沿用已有的可查看作答
    ReviewExisting,
    /// 获取查看页并解析题目
    Render,
    /// 写出快照文档
    Serialize,
    /// 保存关闭或无法查看的测验页面
    CapturePage,
    /// 终止：测验不可作答也不可查看
    Unavailable,
    /// 终止：已写出
    Done,
}

impl QuizState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QuizState::Unavailable | QuizState::Done)
    }
}

impl fmt::Display for QuizState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizEvent {
    /// 概览页上有查看链接
    ReviewLinkFound,
    /// 没有可查看的作答，但页面提供了开始作答的入口
    AttemptRequired,
    /// 既没有查看链接也无法作答
    QuizClosed,
    /// 作答已提交，拿到了查看页地址
    AttemptSubmitted,
    /// 平台拒绝开始或提交作答 (需要密码、次数用尽等)
    AttemptRejected,
    ReviewLocated,
    QuestionsParsed,
    /// 查看页上没有题目 (平台拒绝查看或返回错误页)
    ReviewDenied,
    SnapshotWritten,
    PageCaptured,
}

/// 迁移守卫：由运行配置决定的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Always,
    NewAttemptsAllowed,
    NewAttemptsForbidden,
}

#[derive(Debug, Clone, Copy)]
pub struct QuizPolicy {
    pub start_new_attempts: bool,
}

impl Guard {
    fn admits(self, policy: &QuizPolicy) -> bool {
        match self {
            Guard::Always => true,
            Guard::NewAttemptsAllowed => policy.start_new_attempts,
            Guard::NewAttemptsForbidden => !policy.start_new_attempts,
        }
    }
}

use QuizEvent as E;
use QuizState as S;

const TRANSITIONS: &[(QuizState, QuizEvent, Guard, QuizState)] = &[
    (S::Discover, E::ReviewLinkFound, Guard::Always, S::ReviewExisting),
    (S::Discover, E::AttemptRequired, Guard::NewAttemptsAllowed, S::EnterAttempt),
    (S::Discover, E::AttemptRequired, Guard::NewAttemptsForbidden, S::Unavailable),
    (S::Discover, E::QuizClosed, Guard::Always, S::CapturePage),
    (S::EnterAttempt, E::AttemptSubmitted, Guard::Always, S::Render),
    (S::EnterAttempt, E::AttemptRejected, Guard::Always, S::CapturePage),
    (S::ReviewExisting, E::ReviewLocated, Guard::Always, S::Render),
    (S::Render, E::QuestionsParsed, Guard::Always, S::Serialize),
    (S::Render, E::ReviewDenied, Guard::Always, S::CapturePage),
    (S::Serialize, E::SnapshotWritten, Guard::Always, S::Done),
    (S::CapturePage, E::PageCaptured, Guard::Always, S::Unavailable),
];

/// 查表得到下一个状态；表中没有的组合返回 None
pub fn next_state(state: QuizState, event: QuizEvent, policy: &QuizPolicy) -> Option<QuizState> {
    TRANSITIONS
        .iter()
        .find(|(from, on, guard, _)| *from == state && *on == event && guard.admits(policy))
        .map(|(_, _, _, to)| *to)
}
