//! ラベル付き 2 次元テンソル。
//!
//! 行がサンプル点、列が変数に対応し、最終軸の各列は一意な文字列ラベルを
//! 持ちます。微分演算子はこのラベルを使って成分や微分変数を指定します。

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};

use crate::error::LabelError;

/// 最終軸に順序付きの一意なラベルを持つ 2 次元テンソル。
///
/// 不変条件: ラベル数は常に列数と等しい。列の意味を変える操作
/// (勾配・ラプラシアンなど) は演算子側で新しいラベルを導出します。
#[derive(Debug, Clone)]
pub struct LabelTensor<B: Backend> {
    tensor: Tensor<B, 2>,
    labels: Vec<String>,
}

impl<B: Backend> LabelTensor<B> {
    /// ラベル数と列数の一致・ラベルの一意性を検証して構築します。
    pub fn new(
        tensor: Tensor<B, 2>,
        labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, LabelError> {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let columns = tensor.dims()[1];
        if labels.len() != columns {
            return Err(LabelError::CountMismatch {
                labels: labels.len(),
                columns,
            });
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(LabelError::Duplicate(label.clone()));
            }
        }
        Ok(Self { tensor, labels })
    }

    /// 検証なしで構築します。演算子内部で導出済みラベルに対してのみ使用します。
    pub(crate) fn new_unchecked(tensor: Tensor<B, 2>, labels: Vec<String>) -> Self {
        Self { tensor, labels }
    }

    /// 列ラベルの一覧を返します。
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 内部テンソルへの参照を返します。
    pub fn tensor(&self) -> &Tensor<B, 2> {
        &self.tensor
    }

    /// 内部テンソルを取り出します。
    pub fn into_tensor(self) -> Tensor<B, 2> {
        self.tensor
    }

    /// `[行数, 列数]` を返します。
    pub fn dims(&self) -> [usize; 2] {
        self.tensor.dims()
    }

    /// サンプル点の数 (行数) を返します。
    pub fn n_points(&self) -> usize {
        self.tensor.dims()[0]
    }

    /// ラベルの位置を返します。
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// 指定したラベルの列を要求順に抽出します。
    pub fn extract(&self, labels: &[impl AsRef<str>]) -> Result<Self, LabelError> {
        let mut indices = Vec::with_capacity(labels.len());
        let mut extracted = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let idx = self
                .index_of(label)
                .ok_or_else(|| LabelError::NotFound(label.to_string()))?;
            indices.push(idx as i32);
            extracted.push(label.to_string());
        }
        let device = self.tensor.device();
        let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &device);
        Ok(Self {
            tensor: self.tensor.clone().select(1, indices),
            labels: extracted,
        })
    }

    /// 指定した行を選択します。ラベルは変化しません。
    pub fn select_rows(&self, indices: Tensor<B, 1, Int>) -> Self {
        Self {
            tensor: self.tensor.clone().select(0, indices),
            labels: self.labels.clone(),
        }
    }

    /// ラベル軸 (列方向) に連結します。ラベルは順に連結され、重複は拒否されます。
    pub fn cat(tensors: Vec<Self>) -> Result<Self, LabelError> {
        let mut iter = tensors.into_iter();
        let first = iter.next().ok_or(LabelError::Empty)?;
        let rows = first.n_points();
        let mut labels = first.labels;
        let mut parts = vec![first.tensor];
        for t in iter {
            if t.n_points() != rows {
                return Err(LabelError::RowCountMismatch {
                    left: rows,
                    right: t.n_points(),
                });
            }
            for label in &t.labels {
                if labels.contains(label) {
                    return Err(LabelError::Duplicate(label.clone()));
                }
            }
            labels.extend(t.labels);
            parts.push(t.tensor);
        }
        Ok(Self {
            tensor: Tensor::cat(parts, 1),
            labels,
        })
    }

    /// 行方向に連結します。全テンソルのラベル列が一致している必要があります。
    pub fn cat_rows(tensors: Vec<Self>) -> Result<Self, LabelError> {
        let mut iter = tensors.into_iter();
        let first = iter.next().ok_or(LabelError::Empty)?;
        let labels = first.labels.clone();
        let mut parts = vec![first.tensor];
        for t in iter {
            if t.labels != labels {
                return Err(LabelError::IncompatibleLabels);
            }
            parts.push(t.tensor);
        }
        Ok(Self {
            tensor: Tensor::cat(parts, 0),
            labels,
        })
    }

    /// 同形状のテンソル列を総和します。
    ///
    /// 各列のラベルは `+` で結合されます (全テンソルで一致する場合はそのまま)。
    pub fn summation(tensors: Vec<Self>) -> Result<Self, LabelError> {
        let mut iter = tensors.into_iter();
        let first = iter.next().ok_or(LabelError::Empty)?;
        let dims = first.dims();
        let mut joined: Vec<String> = first.labels;
        let mut sum = first.tensor;
        for t in iter {
            if t.dims() != dims {
                return Err(LabelError::ShapeMismatch);
            }
            for (acc, label) in joined.iter_mut().zip(&t.labels) {
                if acc != label {
                    acc.push('+');
                    acc.push_str(label);
                }
            }
            sum = sum + t.tensor;
        }
        Ok(Self {
            tensor: sum,
            labels: joined,
        })
    }
}

impl<B: AutodiffBackend> LabelTensor<B> {
    /// 1 段内側のバックエンドに降りた同一ラベルのテンソルを返します。
    pub fn inner(&self) -> LabelTensor<B::InnerBackend> {
        LabelTensor {
            tensor: self.tensor.clone().inner(),
            labels: self.labels.clone(),
        }
    }

    /// 内側バックエンドのテンソルを外側へ持ち上げます。
    pub fn from_inner(inner: LabelTensor<B::InnerBackend>) -> Self {
        Self {
            tensor: Tensor::from_inner(inner.tensor),
            labels: inner.labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn tensor(rows: usize, values: &[f32]) -> Tensor<B, 2> {
        let device = Default::default();
        Tensor::<B, 1>::from_floats(values, &device).reshape([rows, values.len() / rows])
    }

    #[test]
    fn new_rejects_count_mismatch() {
        let err = LabelTensor::new(tensor(1, &[1.0, 2.0]), ["x"]).unwrap_err();
        assert_eq!(
            err,
            LabelError::CountMismatch {
                labels: 1,
                columns: 2
            }
        );
    }

    #[test]
    fn new_rejects_duplicate_labels() {
        let err = LabelTensor::new(tensor(1, &[1.0, 2.0]), ["x", "x"]).unwrap_err();
        assert_eq!(err, LabelError::Duplicate("x".into()));
    }

    #[test]
    fn extract_preserves_requested_order() {
        let t = LabelTensor::new(tensor(2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), ["t", "x", "y"])
            .unwrap();
        let sub = t.extract(&["y", "t"]).unwrap();
        assert_eq!(sub.labels(), ["y", "t"]);
        let values = sub.into_tensor().into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0, 1.0, 6.0, 4.0]);
    }

    #[test]
    fn extract_unknown_label_fails() {
        let t = LabelTensor::new(tensor(1, &[1.0]), ["x"]).unwrap();
        assert_eq!(
            t.extract(&["z"]).unwrap_err(),
            LabelError::NotFound("z".into())
        );
    }

    #[test]
    fn cat_concatenates_labels() {
        let a = LabelTensor::new(tensor(2, &[1.0, 2.0]), ["x"]).unwrap();
        let b = LabelTensor::new(tensor(2, &[3.0, 4.0]), ["y"]).unwrap();
        let c = LabelTensor::cat(vec![a, b]).unwrap();
        assert_eq!(c.labels(), ["x", "y"]);
        assert_eq!(c.dims(), [2, 2]);
    }

    #[test]
    fn cat_rows_requires_matching_labels() {
        let a = LabelTensor::new(tensor(1, &[1.0]), ["x"]).unwrap();
        let b = LabelTensor::new(tensor(1, &[2.0]), ["y"]).unwrap();
        assert!(matches!(
            LabelTensor::cat_rows(vec![a, b]),
            Err(LabelError::IncompatibleLabels)
        ));
    }

    #[test]
    fn summation_joins_labels() {
        let a = LabelTensor::new(tensor(1, &[1.0]), ["dudx"]).unwrap();
        let b = LabelTensor::new(tensor(1, &[2.0]), ["dvdy"]).unwrap();
        let s = LabelTensor::summation(vec![a, b]).unwrap();
        assert_eq!(s.labels(), ["dudx+dvdy"]);
        let values = s.into_tensor().into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0]);
    }
}
