use device_dispatch::approx::approx_eq;
use device_dispatch::backend::Backend;
use device_dispatch::error::DispatchError;
use device_dispatch::ops::dispatch::{self, standard};
use device_dispatch::ops::{OpAttrs, TypeConstraint, generic};
use device_dispatch::tensors::{DynTensor, ElementType, Tensor};
use device_dispatch::tensor;

use rand::Rng;

fn dyn_tensor<T>(shape: Vec<usize>, data: Vec<T>) -> DynTensor
where
    Tensor<T>: Into<DynTensor>,
{
    Tensor::new(shape, data).into()
}

fn random_f64(shape: Vec<usize>) -> DynTensor {
    let mut rng = rand::rng();
    let len: usize = shape.iter().product();
    let data = (0..len).map(|_| rng.random_range(-8.0..8.0)).collect();
    dyn_tensor::<f64>(shape, data)
}

#[test]
fn test_add_integers_on_every_backend() {
    let lhs = DynTensor::from(tensor!([1, 2, 3]));
    let rhs = DynTensor::from(tensor!([4, 5, 6]));
    for backend in Backend::ALL {
        let out = dispatch::add(backend, &lhs, &rhs).unwrap();
        assert_eq!(out, DynTensor::from(tensor!([5, 7, 9])), "backend {backend}");
    }
}

#[test]
fn test_add_rejects_non_numeric_without_touching_operands() {
    let lhs = dyn_tensor(vec![3], vec![true, false, true]);
    let rhs = dyn_tensor(vec![3], vec![false, false, true]);
    let (lhs_before, rhs_before) = (lhs.clone(), rhs.clone());

    let err = dispatch::add(Backend::Cpu, &lhs, &rhs).unwrap_err();
    assert_eq!(
        err,
        DispatchError::TypeConstraintViolation {
            op: "add".into(),
            constraint: TypeConstraint::Numeric,
            found: ElementType::Bool,
        }
    );
    assert_eq!(lhs, lhs_before);
    assert_eq!(rhs, rhs_before);
}

#[test]
fn test_exp_requires_floating_point() {
    let x = dyn_tensor(vec![2], vec![1i64, 2]);
    for backend in Backend::ALL {
        assert!(matches!(
            dispatch::exp(backend, &x),
            Err(DispatchError::TypeConstraintViolation {
                constraint: TypeConstraint::FloatingPoint,
                found: ElementType::I64,
                ..
            })
        ));
    }
}

#[test]
fn test_add_reports_mismatches() {
    let a = dyn_tensor(vec![2], vec![1.0f32, 2.0]);
    let b = dyn_tensor(vec![2], vec![1.0f64, 2.0]);
    assert_eq!(
        dispatch::add(Backend::Cpu, &a, &b).unwrap_err(),
        DispatchError::ElementTypeMismatch {
            op: "add".into(),
            lhs: ElementType::F32,
            rhs: ElementType::F64,
        }
    );

    let c = dyn_tensor(vec![1, 2], vec![1.0f32, 2.0]);
    for backend in Backend::ALL {
        assert!(matches!(
            dispatch::add(backend, &a, &c),
            Err(DispatchError::ShapeMismatch { .. })
        ));
    }
}

#[test]
fn test_integer_add_wraps() {
    let a = dyn_tensor(vec![1], vec![i32::MAX]);
    let b = dyn_tensor(vec![1], vec![1]);
    let out = dispatch::add(Backend::Cpu, &a, &b).unwrap();
    assert_eq!(out.into_typed::<i32>().unwrap().data, vec![i32::MIN]);
}

#[test]
fn test_invoke_checks_arity_and_unknown_ops() {
    let x = dyn_tensor(vec![2], vec![1.0f32, 2.0]);
    assert_eq!(
        standard()
            .invoke("add", Backend::Cpu, &[&x], &OpAttrs::default())
            .unwrap_err(),
        DispatchError::ArityMismatch {
            op: "add".into(),
            expected: 2,
            found: 1,
        }
    );
    assert_eq!(
        standard()
            .invoke("conv", Backend::Cpu, &[&x], &OpAttrs::default())
            .unwrap_err(),
        DispatchError::UnknownOperation("conv".into())
    );
}

#[test]
fn test_invoke_rejects_malformed_operands() {
    let bad = DynTensor::from(Tensor {
        shape: vec![2, 2],
        data: vec![1.0f32, 2.0, 3.0],
    });
    assert_eq!(
        dispatch::exp(Backend::Cpu, &bad).unwrap_err(),
        DispatchError::MalformedTensor {
            shape: vec![2, 2],
            len: 3,
        }
    );
}

#[test]
fn test_invoke_rejects_overflowing_shapes() {
    let wide = DynTensor::from(Tensor {
        shape: vec![usize::MAX, 3],
        data: vec![1.0f32],
    });
    assert_eq!(
        dispatch::exp(Backend::Cpu, &wide).unwrap_err(),
        DispatchError::MalformedTensor {
            shape: vec![usize::MAX, 3],
            len: 1,
        }
    );

    let wrapped = DynTensor::from(Tensor::<i64> {
        shape: vec![usize::MAX / 2 + 1, 2],
        data: vec![],
    });
    for backend in Backend::ALL {
        assert!(matches!(
            dispatch::sum(backend, &wrapped, -1),
            Err(DispatchError::MalformedTensor { len: 0, .. })
        ));
    }
}

#[test]
fn test_sum_along_axes_keeps_dims() {
    let x = DynTensor::from(tensor!([[1, 2, 3], [4, 5, 6]]));
    for backend in Backend::ALL {
        let rows = dispatch::sum(backend, &x, -1).unwrap();
        assert_eq!(rows, dyn_tensor(vec![2, 1], vec![6, 15]));

        let cols = dispatch::sum(backend, &x, 0).unwrap();
        assert_eq!(cols, dyn_tensor(vec![1, 3], vec![5, 7, 9]));
    }
}

#[test]
fn test_sum_defaults_to_last_axis() {
    let x = DynTensor::from(tensor!([[1.0, 2.0], [3.0, 4.0]]));
    let out = standard()
        .invoke("sum", Backend::Cpu, &[&x], &OpAttrs::default())
        .unwrap();
    assert_eq!(out, dyn_tensor(vec![2, 1], vec![3.0, 7.0]));
}

#[test]
fn test_sum_of_middle_axis() {
    let x = dyn_tensor(vec![2, 3, 2], (1..=12).collect::<Vec<i64>>());
    let out = dispatch::sum(Backend::Cuda, &x, 1).unwrap();
    assert_eq!(out, dyn_tensor(vec![2, 1, 2], vec![9i64, 12, 27, 30]));
}

#[test]
fn test_sum_rejects_bad_axes() {
    let x = DynTensor::from(tensor!([1, 2]));
    assert_eq!(
        dispatch::sum(Backend::Cpu, &x, 1).unwrap_err(),
        DispatchError::InvalidAxis { axis: 1, rank: 1 }
    );
    assert_eq!(
        dispatch::sum(Backend::Cpu, &x, -2).unwrap_err(),
        DispatchError::InvalidAxis { axis: -2, rank: 1 }
    );
    let scalar = DynTensor::from(tensor!(3));
    assert!(matches!(
        dispatch::sum(Backend::Cpu, &scalar, 0),
        Err(DispatchError::InvalidAxis { rank: 0, .. })
    ));
}

#[test]
fn test_softmax_rows_sum_to_one() {
    let x = random_f64(vec![4, 7]);
    for backend in Backend::ALL {
        let y = dispatch::softmax(backend, &x).unwrap();
        let totals = dispatch::sum(backend, &y, -1).unwrap();
        let totals = totals.into_typed::<f64>().unwrap();
        assert_eq!(totals.shape, vec![4, 1]);
        assert!(approx_eq(&totals.data[..], &[1.0; 4][..]), "backend {backend}");
    }
}

#[test]
fn test_softmax_known_values() {
    let x = DynTensor::from(tensor!([[0.0f32, 0.0], [0.0, 1000.0]]));
    for backend in Backend::ALL {
        let y = dispatch::softmax(backend, &x).unwrap();
        let expected = DynTensor::from(tensor!([[0.5f32, 0.5], [0.0, 1.0]]));
        assert!(approx_eq(&y, &expected), "backend {backend}: {y:?}");
    }
}

#[test]
fn test_softmax_of_empty_rows_is_empty() {
    let x = dyn_tensor::<f32>(vec![3, 0], vec![]);
    let y = dispatch::softmax(Backend::Cpu, &x).unwrap();
    assert_eq!(y.shape(), &[3, 0]);
    assert!(y.is_empty());
}

#[test]
fn test_overrides_match_generic_kernels() {
    let attrs = OpAttrs::default();
    for _ in 0..8 {
        let a = random_f64(vec![5, 9]);
        let b = random_f64(vec![5, 9]);

        let reference = generic::add(&[&a, &b], &attrs).unwrap();
        let exp_reference = generic::exp(&[&a], &attrs).unwrap();
        let softmax_reference = generic::softmax(&[&a], &attrs).unwrap();

        for backend in Backend::ALL {
            assert_eq!(dispatch::add(backend, &a, &b).unwrap(), reference);
            assert_eq!(dispatch::exp(backend, &a).unwrap(), exp_reference);
            let y = dispatch::softmax(backend, &a).unwrap();
            assert!(approx_eq(&y, &softmax_reference), "backend {backend}");
        }
    }
}

#[test]
fn test_standard_registry_overrides() {
    let registry = standard();
    assert_eq!(registry.overridden_by(Backend::Cpu), vec!["add", "exp", "softmax"]);
    assert_eq!(registry.resolve("sum", Backend::Cpu).unwrap().label(), "generic.sum");
    assert_eq!(registry.resolve("add", Backend::Cpu).unwrap().label(), "cpu.add");

    #[cfg(feature = "cuda")]
    {
        assert_eq!(registry.overridden_by(Backend::Cuda), vec!["softmax"]);
        assert_eq!(registry.resolve("softmax", Backend::Cuda).unwrap().label(), "cuda.softmax");
    }
    #[cfg(not(feature = "cuda"))]
    assert!(registry.overridden_by(Backend::Cuda).is_empty());

    assert_eq!(registry.resolve("add", Backend::Cuda).unwrap().label(), "generic.add");
}

#[test]
fn test_softmax_grad_closed_form() {
    let y = dyn_tensor(vec![1, 3], vec![0.2f64, 0.3, 0.5]);
    let dy = dyn_tensor(vec![1, 3], vec![1.0f64, 0.0, 0.0]);
    // dot = 0.2; dx = (dy - 0.2) * y
    let expected = dyn_tensor(vec![1, 3], vec![0.16f64, -0.06, -0.1]);
    for backend in Backend::ALL {
        let dx = dispatch::softmax_grad(backend, &y, &dy).unwrap();
        assert!(approx_eq(&dx, &expected), "backend {backend}: {dx:?}");
    }
}
