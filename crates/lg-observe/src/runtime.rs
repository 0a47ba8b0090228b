use std::future::Future;

/// Drives `fut` to completion from synchronous code.
///
/// Inside a multi-threaded tokio runtime this parks the current worker with
/// `block_in_place`; outside any runtime a throwaway current-thread runtime is built.
pub fn block_on<Fut>(fut: Fut) -> std::io::Result<Fut::Output>
where
    Fut: Future,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(tokio::task::block_in_place(|| handle.block_on(fut))),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            Ok(rt.block_on(fut))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_without_ambient_runtime() {
        let v = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_inside_multi_thread_runtime() {
        let v = block_on(async {
            tokio::task::yield_now().await;
            "done"
        })
        .unwrap();
        assert_eq!(v, "done");
    }
}
