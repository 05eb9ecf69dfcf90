use device_dispatch::approx::{ApproxEquality, RelativeEq, approx_eq};
use device_dispatch::error::DispatchError;
use device_dispatch::tensor;
use device_dispatch::tensors::{DynTensor, ElementType, Tensor, element_count};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.rank(), 2);
    assert_eq!(t.len(), 4);
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_checked_construction() {
    assert_eq!(
        Tensor::try_new(vec![3, 2], vec![0u8; 5]).unwrap_err(),
        DispatchError::MalformedTensor {
            shape: vec![3, 2],
            len: 5,
        }
    );
    let scalar = Tensor::try_new(Vec::<usize>::new(), vec![9i32]).unwrap();
    assert_eq!(scalar.rank(), 0);
}

#[test]
fn test_overflowing_shapes_are_malformed() {
    assert_eq!(element_count(&[usize::MAX, 2]), None);
    assert_eq!(element_count(&[3, 0, 5]), Some(0));

    assert_eq!(
        Tensor::<f32>::try_new(vec![usize::MAX, 2, 0], vec![]).unwrap_err(),
        DispatchError::MalformedTensor {
            shape: vec![usize::MAX, 2, 0],
            len: 0,
        }
    );
    assert!(Tensor::<i32>::try_new(vec![usize::MAX / 2 + 1, 2], vec![]).is_err());
    assert!(Tensor::<i32>::try_new(vec![0, usize::MAX], vec![]).is_ok());
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);

    let s = tensor!(5);
    assert!(s.shape.is_empty());
    assert_eq!(s.data, vec![5]);
}

#[test]
fn test_element_type_tags() {
    let cases = [
        (DynTensor::from(tensor!([true])), ElementType::Bool),
        (DynTensor::from(tensor!([1i32])), ElementType::I32),
        (DynTensor::from(tensor!([1i64])), ElementType::I64),
        (DynTensor::from(tensor!([1.0f32])), ElementType::F32),
        (DynTensor::from(tensor!([1.0f64])), ElementType::F64),
    ];
    for (tensor, expected) in cases {
        assert_eq!(tensor.element_type(), expected);
    }

    assert!(!ElementType::Bool.is_numeric());
    assert!(ElementType::I64.is_numeric() && !ElementType::I64.is_floating_point());
    assert!(ElementType::F32.is_floating_point());
    assert_eq!(ElementType::F64.size_in_bytes(), 8);
    assert_eq!(ElementType::I32.to_string(), "i32");
}

#[test]
fn test_downcasting() {
    let d = DynTensor::from(tensor!([[1.0f32, 2.0]]));
    assert_eq!(d.downcast_ref::<f32>().unwrap().shape, vec![1, 2]);
    assert!(d.downcast_ref::<f64>().is_none());
    assert_eq!(
        d.into_typed::<i32>().unwrap_err(),
        DispatchError::UnexpectedElementType {
            expected: ElementType::I32,
            found: ElementType::F32,
        }
    );
}

#[test]
fn test_approx_ratings() {
    assert_eq!(1.0f64.approx_eq(&1.0), ApproxEquality::Precise);
    assert_eq!(1.0f64.approx_eq(&1.0001), ApproxEquality::Relative);
    assert_eq!(1.0f32.approx_eq(&2.0), ApproxEquality::Scarce);

    // one bad element spoils the whole slice
    let a = [1.0f64, 2.0, 3.0];
    let b = [1.0f64, 2.5, 3.0];
    assert_eq!(a[..].approx_eq(&b[..]), ApproxEquality::Scarce);
    assert!(!approx_eq(&a[..], &a[..2]));

    let ints = DynTensor::from(tensor!([1, 2]));
    let floats = DynTensor::from(tensor!([1.0, 2.0]));
    assert!(approx_eq(&ints, &ints.clone()));
    assert!(!approx_eq(&ints, &floats));
}
