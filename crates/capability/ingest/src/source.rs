use crate::IngestError;
use async_trait::async_trait;
use domain::{ConnectionState, Reading};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;

/// 读数流：取消时静默结束；致命错误时先产出一个 `Err` 再结束。
pub type ReadingStream<'a> = BoxStream<'a, Result<Reading, IngestError>>;

/// 功率数据源。
///
/// 调用方只持有 `Box<dyn Source>`，不依赖具体实现。
#[async_trait]
pub trait Source: Send {
    /// 日志与错误中使用的名称。
    fn name(&self) -> &'static str;

    /// 一次性引导；失败即致命，不在内部重试。
    async fn connect(&mut self) -> Result<(), IngestError>;

    /// 取下一条读数。
    ///
    /// 内部完成重连与退避；`Ok(None)` 表示已取消，`Err` 均为致命错误。
    async fn next_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Reading>, IngestError>;

    fn state(&self) -> ConnectionState;
}

/// 把数据源包装成惰性读数流。
pub fn reading_stream<'a, S>(source: &'a mut S, cancel: CancellationToken) -> ReadingStream<'a>
where
    S: Source + ?Sized + 'a,
{
    stream::unfold(Some((source, cancel)), |state| async move {
        let (source, cancel) = state?;
        match source.next_reading(&cancel).await {
            Ok(Some(reading)) => Some((Ok(reading), Some((source, cancel)))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}
