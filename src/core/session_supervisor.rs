//! 会话监管：运行时生命周期
//!
//! 持有 CancellationToken；Quit 命令或 Ctrl+C 时取消，命令循环随之退出。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 收到 Ctrl+C 时取消（后台任务）
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_ok() {
                        tracing::info!("Ctrl+C received, shutting down session");
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }
}
