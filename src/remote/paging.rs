// ==========================================
// ERP 导入连接器 - 分页拉取流水线
// ==========================================
// 职责: fetchCollection — 惰性、可重启的分页行序列
// 流程: 后台任务按页拉取 → 有界通道 (预取) → 消费方逐页转换
// 规则:
// - 首个错误作为最后一项返回,随后流结束
// - 消费方丢弃流或取消令牌触发时,后台任务停止
// - 每次调用重新从第一页开始
// ==========================================

use crate::remote::client::{CollectionQuery, RemoteClient, RemotePage};
use crate::remote::error::{RemoteError, RemoteResult};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type PageStream = BoxStream<'static, RemoteResult<RemotePage>>;

/// 拉取远程集合
///
/// # 参数
/// - client: 远程客户端 (通常已包装 Retrying)
/// - query: 查询条件
/// - prefetch: 预取页数 (通道容量,至少 1)
/// - cancel: 取消令牌
pub fn fetch_collection(
    client: Arc<dyn RemoteClient>,
    query: CollectionQuery,
    prefetch: usize,
    cancel: CancellationToken,
) -> PageStream {
    let (tx, rx) = mpsc::channel::<RemoteResult<RemotePage>>(prefetch.max(1));

    tokio::spawn(async move {
        let mut cursor: Option<String> = None;
        let mut page_no = 0usize;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(object = %query.object, page_no, "分页拉取已取消");
                    break;
                }
                r = client.fetch_page(&query, cursor.as_deref()) => r,
            };
            page_no += 1;

            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            };

            let next = page.next_cursor.clone();
            debug!(
                object = %query.object,
                page_no,
                rows = page.rows.len(),
                has_more = next.is_some(),
                "远程页拉取完成"
            );

            if tx.send(Ok(page)).await.is_err() {
                // 消费方已丢弃流
                break;
            }

            match next {
                None => break,
                Some(c) if cursor.as_deref() == Some(c.as_str()) => {
                    let _ = tx
                        .send(Err(RemoteError::Protocol(format!(
                            "{} 续页标记未前进: {}",
                            query.object, c
                        ))))
                        .await;
                    break;
                }
                Some(c) => cursor = Some(c),
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
