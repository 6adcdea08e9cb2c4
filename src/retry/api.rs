use std::future::Future;

use kube::{
    Api, Error as KubeError,
    api::{ListParams, ObjectList},
    core::PartialObjectMeta,
};
use serde::de::DeserializeOwned;

use super::{RetryPolicy, retry_with_policy};

/// Retrying variants of the read calls the node client needs on `Api<T>`.
pub trait ApiRetryExt<K> {
    fn list_metadata_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        lp: &'a ListParams,
    ) -> impl Future<Output = Result<ObjectList<PartialObjectMeta<K>>, KubeError>> + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug;

    fn get_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        name: &'a str,
    ) -> impl Future<Output = Result<K, KubeError>> + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug;
}

impl<K> ApiRetryExt<K> for Api<K> {
    fn list_metadata_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        lp: &'a ListParams,
    ) -> impl Future<Output = Result<ObjectList<PartialObjectMeta<K>>, KubeError>> + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug,
    {
        async move { retry_with_policy(&policy, || self.list_metadata(lp)).await }
    }

    fn get_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        name: &'a str,
    ) -> impl Future<Output = Result<K, KubeError>> + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug,
    {
        async move { retry_with_policy(&policy, || self.get(name)).await }
    }
}
